//! Clock contract consumed by the core
//!
//! The core only reads the time, asks for the next timer shot and queries the
//! resolution. Tick announcement and clock adjustment belong to the clock
//! subsystem.
use core::{
    fmt, ops,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::time::Instant;

/// A point on, or a distance along, a clock's monotonic timeline, counted in
/// nanoseconds.
///
/// When used as a relative timeout, [`Ktime::INFINITE`] means "wait forever".
/// As an absolute timeout it is the clock's zero point, a date already
/// passed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ktime(u64);

impl Ktime {
    /// The relative timeout value meaning "no timeout".
    pub const INFINITE: Self = Self(0);

    /// The zero point of a clock.
    pub const ZERO: Self = Self(0);

    /// The largest representable time.
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.0 == Self::INFINITE.0
    }

    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for Ktime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl From<Duration> for Ktime {
    #[inline]
    fn from(x: Duration) -> Self {
        Self(u64::try_from(x.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<Ktime> for Duration {
    #[inline]
    fn from(x: Ktime) -> Self {
        Duration::from_nanos(x.0)
    }
}

impl ops::Add for Ktime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl ops::Sub for Ktime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

/// Specifies how a timeout value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutMode {
    /// The timeout is a delay counted from the moment the wait starts.
    Rel,
    /// The timeout is a date on the clock's timeline.
    Abs,
}

/// A time source driving the timeouts of a core instance.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Human-readable name of the clock.
    fn name(&self) -> &str;

    /// Read the current monotonic time.
    fn read(&self) -> Ktime;

    /// Request a timer event no later than `deadline`. A previously programmed
    /// shot is superseded. [`Ktime::MAX`] cancels the request.
    fn program_next_shot(&self, deadline: Ktime);

    /// The granularity of the clock.
    fn resolution(&self) -> Ktime;
}

/// The host's monotonic clock.
pub struct MonotonicClock {
    origin: Instant,
    next_shot: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            next_shot: AtomicU64::new(u64::MAX),
        }
    }

    /// The date of the next requested timer event, if any.
    pub fn next_shot(&self) -> Option<Ktime> {
        match self.next_shot.load(Ordering::Acquire) {
            u64::MAX => None,
            x => Some(Ktime(x)),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MonotonicClock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MonotonicClock")
            .field("now", &self.read())
            .field("next_shot", &self.next_shot())
            .finish()
    }
}

impl Clock for MonotonicClock {
    fn name(&self) -> &str {
        "monotonic"
    }

    fn read(&self) -> Ktime {
        self.origin.elapsed().into()
    }

    fn program_next_shot(&self, deadline: Ktime) {
        self.next_shot.store(deadline.0, Ordering::Release);
    }

    fn resolution(&self) -> Ktime {
        Ktime(1)
    }
}

/// A clock that only moves when told to. Used to drive the core
/// deterministically.
pub struct ManualClock {
    now: AtomicU64,
    next_shot: AtomicU64,
    resolution: Ktime,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self::with_resolution(Ktime(1))
    }

    pub const fn with_resolution(resolution: Ktime) -> Self {
        Self {
            now: AtomicU64::new(0),
            next_shot: AtomicU64::new(u64::MAX),
            resolution,
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Ktime) {
        self.now.fetch_add(delta.0, Ordering::AcqRel);
    }

    /// Jump to `date`. The clock never goes backwards.
    pub fn set(&self, date: Ktime) {
        self.now.fetch_max(date.0, Ordering::AcqRel);
    }

    /// The date of the next requested timer event, if any.
    pub fn next_shot(&self) -> Option<Ktime> {
        match self.next_shot.load(Ordering::Acquire) {
            u64::MAX => None,
            x => Some(Ktime(x)),
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.read())
            .field("next_shot", &self.next_shot())
            .finish()
    }
}

impl Clock for ManualClock {
    fn name(&self) -> &str {
        "manual"
    }

    fn read(&self) -> Ktime {
        Ktime(self.now.load(Ordering::Acquire))
    }

    fn program_next_shot(&self, deadline: Ktime) {
        self.next_shot.store(deadline.0, Ordering::Release);
    }

    fn resolution(&self) -> Ktime {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_forward_only() {
        let clock = ManualClock::new();
        clock.advance(Ktime::from_micros(5));
        assert_eq!(clock.read(), Ktime::from_nanos(5_000));
        clock.set(Ktime::from_nanos(1_000));
        assert_eq!(clock.read(), Ktime::from_nanos(5_000));
        clock.set(Ktime::from_millis(1));
        assert_eq!(clock.read(), Ktime::from_nanos(1_000_000));
    }

    #[test]
    fn next_shot() {
        let clock = ManualClock::new();
        assert_eq!(clock.next_shot(), None);
        clock.program_next_shot(Ktime::from_nanos(42));
        assert_eq!(clock.next_shot(), Some(Ktime::from_nanos(42)));
        clock.program_next_shot(Ktime::MAX);
        assert_eq!(clock.next_shot(), None);
    }

    #[test]
    fn ktime_arithmetic_saturates() {
        assert_eq!(Ktime::from_nanos(3) - Ktime::from_nanos(5), Ktime::ZERO);
        assert_eq!(Ktime::MAX + Ktime::from_nanos(1), Ktime::MAX);
        assert_eq!(
            Ktime::from(Duration::from_millis(2)),
            Ktime::from_millis(2)
        );
    }

    #[test]
    fn monotonic_clock_reads() {
        let clock = MonotonicClock::new();
        let t0 = clock.read();
        let t1 = clock.read();
        assert!(t1 >= t0);
    }
}
