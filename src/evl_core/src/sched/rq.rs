//! Per-CPU run-queue
use bitflags::bitflags;

use super::{queue::MultiLevelQueue, SchedClass};
use crate::thread::ThreadId;

bitflags! {
    /// Run-queue status bits.
    pub struct RqFlags: u32 {
        /// A new scheduling decision is pending on this run-queue.
        const RESCHED = 1 << 0;
    }
}

/// The container of the threads runnable on one CPU, partitioned by
/// scheduling class.
///
/// A thread appears in at most one class sub-queue at a time, and only while
/// its `READY` state bit is set. The running thread (`curr`) is not queued.
#[derive(Debug)]
pub struct RunQueue {
    pub(crate) cpu: usize,
    pub(crate) curr: Option<ThreadId>,
    pub(crate) flags: RqFlags,
    pub(crate) rt: MultiLevelQueue,
    pub(crate) fifo: MultiLevelQueue,
    pub(crate) nr_switches: u64,
}

impl RunQueue {
    pub(crate) fn new(cpu: usize) -> Self {
        let mut rq = Self {
            cpu,
            curr: None,
            flags: RqFlags::empty(),
            rt: MultiLevelQueue::new(),
            fifo: MultiLevelQueue::new(),
            nr_switches: 0,
        };
        for class in SchedClass::BY_WEIGHT {
            class.ops().init(&mut rq);
        }
        rq
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    /// The thread currently elected to run on this CPU.
    pub fn curr(&self) -> Option<ThreadId> {
        self.curr
    }

    pub fn needs_resched(&self) -> bool {
        self.flags.contains(RqFlags::RESCHED)
    }

    /// The number of context switches performed so far.
    pub fn nr_switches(&self) -> u64 {
        self.nr_switches
    }

    /// The runnable queue of `class`.
    pub fn runnable(&self, class: SchedClass) -> &MultiLevelQueue {
        class.ops().runnable(self)
    }

    /// The number of queued runnable threads across all classes.
    pub fn nr_runnable(&self) -> usize {
        SchedClass::BY_WEIGHT
            .iter()
            .map(|class| self.runnable(*class).len())
            .sum()
    }

    #[inline]
    pub(crate) fn set_resched(&mut self) {
        self.flags.insert(RqFlags::RESCHED);
    }
}
