//! Core state
use slab::Slab;

use crate::{
    cfg::KernelCfg,
    clock::Clock,
    error::BadIdError,
    flag::FlagCb,
    mutex::MutexCb,
    sched::RunQueue,
    sem::SemCb,
    thread::{ThreadCb, ThreadId},
    timeout::TimerQueue,
    wait::WaitQueueCb,
};

/// The complete state of a core instance: threads, synchronization objects,
/// run-queues and timers.
///
/// Every service is a method of `State`, and holding `&mut State` is
/// equivalent to holding the big core lock (*nklock*). Services that may
/// block the calling thread return [`core::task::Poll`]: `Poll::Pending`
/// means the thread went to sleep and the outcome is to be collected with the
/// matching `complete_*` method once it runs again.
///
/// [`crate::Kernel`] wraps a `State` in a spinlock and maps sleeping core
/// threads onto parked host threads.
#[derive(Debug)]
pub struct State {
    pub(crate) cfg: KernelCfg,
    pub(crate) threads: Slab<ThreadCb>,
    pub(crate) mutexes: Slab<MutexCb>,
    pub(crate) wait_queues: Slab<WaitQueueCb>,
    pub(crate) flags: Slab<FlagCb>,
    pub(crate) sems: Slab<SemCb>,
    pub(crate) rqs: Vec<RunQueue>,
    pub(crate) timers: TimerQueue,
    /// The generation given to the last created object other than a thread.
    last_gen: u32,
    /// The generation given to the last created thread.
    last_thread_gen: u32,
    /// Host threads to unpark once the lock is released.
    pub(crate) woken: Vec<std::thread::Thread>,
}

impl State {
    pub fn new(cfg: KernelCfg) -> Self {
        let rqs = (0..cfg.num_cpus).map(RunQueue::new).collect();
        Self {
            threads: Slab::with_capacity(cfg.max_threads),
            mutexes: Slab::new(),
            wait_queues: Slab::new(),
            flags: Slab::new(),
            sems: Slab::new(),
            rqs,
            timers: TimerQueue::new(),
            last_gen: 0,
            last_thread_gen: 0,
            woken: Vec::new(),
            cfg,
        }
    }

    pub fn cfg(&self) -> &KernelCfg {
        &self.cfg
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.cfg.clock
    }

    pub fn num_cpus(&self) -> usize {
        self.rqs.len()
    }

    /// The run-queue of `cpu`.
    ///
    /// # Panics
    ///
    /// Panics if `cpu` is out of range.
    pub fn run_queue(&self, cpu: usize) -> &RunQueue {
        &self.rqs[cpu]
    }

    /// Get the control block of `thread`. Returns `None` if the identifier is
    /// stale.
    pub fn thread(&self, thread: ThreadId) -> Option<&ThreadCb> {
        self.thread_cb(thread).ok()
    }

    /// Iterate over all existing threads.
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads
            .iter()
            .map(|(slot, cb)| ThreadId::new(slot, cb.gen))
    }

    pub(crate) fn next_gen(&mut self) -> u32 {
        self.last_gen = self.last_gen.wrapping_add(1);
        self.last_gen
    }

    pub(crate) fn next_thread_gen(&mut self) -> u32 {
        self.last_thread_gen = self.last_thread_gen.wrapping_add(1);
        self.last_thread_gen
    }

    pub(crate) fn thread_cb(&self, thread: ThreadId) -> Result<&ThreadCb, BadIdError> {
        self.threads
            .get(thread.slot())
            .filter(|cb| cb.gen == thread.gen())
            .ok_or(BadIdError::BadId)
    }

    pub(crate) fn thread_cb_mut(&mut self, thread: ThreadId) -> Result<&mut ThreadCb, BadIdError> {
        self.threads
            .get_mut(thread.slot())
            .filter(|cb| cb.gen == thread.gen())
            .ok_or(BadIdError::BadId)
    }

    /// Get the control block of a thread known to exist.
    #[inline]
    pub(crate) fn th(&self, thread: ThreadId) -> &ThreadCb {
        let cb = &self.threads[thread.slot()];
        debug_assert_eq!(cb.gen, thread.gen());
        cb
    }

    #[inline]
    pub(crate) fn th_mut(&mut self, thread: ThreadId) -> &mut ThreadCb {
        let cb = &mut self.threads[thread.slot()];
        debug_assert_eq!(cb.gen, thread.gen());
        cb
    }

    /// Take the host threads resumed since the last call.
    pub(crate) fn take_woken(&mut self) -> Vec<std::thread::Thread> {
        std::mem::take(&mut self.woken)
    }
}
