//! Static configuration of a core instance
use std::sync::Arc;

use crate::{
    clock::{Clock, Ktime, MonotonicClock},
    error::{BadParamError, CfgError},
    thread::MAX_THREADS,
};

/// The largest number of CPUs a core instance can manage.
pub const MAX_CPUS: usize = 64;

/// Builds a [`KernelCfg`].
///
/// # Examples
///
/// ```
/// use evl_core::{cfg::CfgBuilder, clock::Ktime};
/// let cfg = CfgBuilder::new()
///     .num_cpus(2)
///     .rr_quantum(Ktime::from_millis(5))
///     .finish()
///     .unwrap();
/// assert_eq!(cfg.num_cpus(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CfgBuilder {
    num_cpus: usize,
    max_threads: usize,
    rr_quantum: Ktime,
    clock: Option<Arc<dyn Clock>>,
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self {
            num_cpus: 1,
            max_threads: 256,
            rr_quantum: Ktime::from_millis(1),
            clock: None,
        }
    }

    /// Set the number of CPUs, each of which gets a run-queue.
    pub fn num_cpus(self, num_cpus: usize) -> Self {
        Self { num_cpus, ..self }
    }

    /// Set the largest number of threads that may exist at once.
    pub fn max_threads(self, max_threads: usize) -> Self {
        Self {
            max_threads,
            ..self
        }
    }

    /// Set the time slice of round-robin threads created without an explicit
    /// quantum.
    pub fn rr_quantum(self, rr_quantum: Ktime) -> Self {
        Self { rr_quantum, ..self }
    }

    /// Set the clock timeouts are measured on. Defaults to
    /// [`MonotonicClock`].
    pub fn clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock: Some(clock),
            ..self
        }
    }

    /// Validate the configuration.
    pub fn finish(self) -> Result<KernelCfg, CfgError> {
        if !(1..=MAX_CPUS).contains(&self.num_cpus)
            || !(1..=MAX_THREADS).contains(&self.max_threads)
            || self.rr_quantum == Ktime::ZERO
        {
            return Err(BadParamError::BadParam.into());
        }
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        log::debug!(
            "{} CPU(s), {} threads max, clock {:?}",
            self.num_cpus,
            self.max_threads,
            clock.name()
        );
        Ok(KernelCfg {
            num_cpus: self.num_cpus,
            max_threads: self.max_threads,
            rr_quantum: self.rr_quantum,
            clock,
        })
    }
}

impl Default for CfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The validated configuration of a core instance.
#[derive(Debug, Clone)]
pub struct KernelCfg {
    pub(crate) num_cpus: usize,
    pub(crate) max_threads: usize,
    pub(crate) rr_quantum: Ktime,
    pub(crate) clock: Arc<dyn Clock>,
}

impl KernelCfg {
    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    pub fn rr_quantum(&self) -> Ktime {
        self.rr_quantum
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
