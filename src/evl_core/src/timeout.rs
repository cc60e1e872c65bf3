//! Thread timers
//!
//! Every timed wait arms a one-shot timer on the clock of the core instance.
//! Timers are kept ordered by expiration date; the clock is asked for a shot
//! at the earliest one.
use std::collections::BTreeMap;

use crate::{
    clock::Ktime,
    thread::{ThreadId, ThreadInfo, ThreadState},
    State,
};

/// Identifies an armed timer. Two timers armed for the same date fire in the
/// order they were armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TimerKey {
    at: Ktime,
    seq: u64,
}

impl TimerKey {
    #[inline]
    pub(crate) fn at(&self) -> Ktime {
        self.at
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    entries: BTreeMap<TimerKey, ThreadId>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, at: Ktime, thread: ThreadId) -> TimerKey {
        let key = TimerKey {
            at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(key, thread);
        key
    }

    pub(crate) fn remove(&mut self, key: TimerKey) -> Option<ThreadId> {
        self.entries.remove(&key)
    }

    /// The earliest expiration date.
    pub(crate) fn first(&self) -> Option<Ktime> {
        self.entries.keys().next().map(|key| key.at)
    }

    /// Remove and return a timer that is due at `now`.
    pub(crate) fn pop_expired(&mut self, now: Ktime) -> Option<ThreadId> {
        let (&key, _) = self.entries.iter().next()?;
        if key.at > now {
            return None;
        }
        self.entries.remove(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl State {
    /// Arm the timer of `thread` for `at`.
    pub(crate) fn arm_timer(&mut self, thread: ThreadId, at: Ktime) {
        debug_assert!(self.th(thread).timer.is_none());
        let key = self.timers.insert(at, thread);
        self.th_mut(thread).timer = Some(key);
        self.program_clock();
    }

    /// Disarm the timer of `thread`, if any.
    pub(crate) fn cancel_timer(&mut self, thread: ThreadId) {
        if let Some(key) = self.th_mut(thread).timer.take() {
            let removed = self.timers.remove(key);
            debug_assert_eq!(removed, Some(thread));
            self.program_clock();
        }
    }

    fn program_clock(&self) {
        let next = self.timers.first().unwrap_or(Ktime::MAX);
        self.cfg.clock.program_next_shot(next);
    }

    /// The expiration date of the timer of `thread`.
    pub fn thread_timeout(&self, thread: ThreadId) -> Option<Ktime> {
        self.thread(thread)?.timer.map(|key| key.at())
    }

    /// The number of armed timers.
    pub fn nr_timers(&self) -> usize {
        self.timers.len()
    }

    /// Fire every timer due at the current time of the clock. Returns the
    /// number of timers fired.
    ///
    /// A clock driver calls this when the shot it was programmed for
    /// elapses.
    pub fn expire_timers(&mut self) -> usize {
        let now = self.cfg.clock.read();
        let mut count = 0;
        while let Some(thread) = self.timers.pop_expired(now) {
            self.th_mut(thread).timer = None;
            self.handle_timeout(thread);
            count += 1;
        }
        if count > 0 {
            log::trace!("{count} timer(s) fired at {now:?}");
            self.program_clock();
        }
        count
    }

    /// Complete the timed wait of `thread` with a timeout.
    pub(crate) fn handle_timeout(&mut self, thread: ThreadId) {
        debug_assert!(self.th(thread).timer.is_none());
        self.th_mut(thread).info.insert(ThreadInfo::TIMEO);
        if self.th(thread).wchan.is_some() {
            self.abort_wait(thread);
        }
        self.resume_thread(thread, ThreadState::PEND | ThreadState::DELAY);
    }
}
