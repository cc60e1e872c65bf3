//! Scheduling classes and the per-CPU scheduler
//!
//! Two priority-based classes are provided: [`SchedClass::Rt`] and
//! [`SchedClass::Fifo`]. Every thread has a *base* class and priority set by
//! [`State::set_schedparam`], and a *current* class and priority which may be
//! temporarily raised by a priority boost (see [`crate::mutex`]).
//!
//! Threads are compared by *weighted priority* (`wprio`): the weight of the
//! class scaled by [`WEIGHT_FACTOR`] plus the priority within the class. Any
//! thread of a heavier class therefore outranks every thread of a lighter one.
use core::fmt;

use crate::{
    clock::Ktime,
    error::{BadObjectStateError, BadParamError, RotateError, SetSchedParamError},
    mutex::Boost,
    thread::{ThreadCb, ThreadId, ThreadState},
    wait::WalkMode,
    State,
};

mod fifo;
mod queue;
mod rq;
mod rt;
pub use self::{
    queue::MultiLevelQueue,
    rq::{RqFlags, RunQueue},
};

/// The lowest priority of the core scale.
pub const CORE_MIN_PRIO: i32 = 0;
/// The highest priority of the core scale.
pub const CORE_MAX_PRIO: i32 = 101;
/// The number of priority levels of the core scale.
pub const CORE_NR_PRIO: usize = (CORE_MAX_PRIO - CORE_MIN_PRIO + 1) as usize;

/// The lowest priority a user thread may request in the FIFO class.
pub const FIFO_MIN_PRIO: i32 = 1;
/// The highest priority a user thread may request in the FIFO class.
pub const FIFO_MAX_PRIO: i32 = 99;

/// The factor class weights are scaled by to form weighted priorities.
pub const WEIGHT_FACTOR: i32 = 1024;

/// A scheduling class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedClass {
    /// Core-internal real-time class spanning the whole core scale.
    Rt,
    /// POSIX `SCHED_FIFO`, with optional round-robin time slicing.
    Fifo,
}

impl SchedClass {
    /// All classes, heaviest first. This is the order in which the scheduler
    /// asks each class for a candidate.
    pub const BY_WEIGHT: [Self; 2] = [Self::Rt, Self::Fifo];

    /// The operation table of the class.
    #[inline]
    pub fn ops(self) -> &'static dyn SchedClassOps {
        match self {
            Self::Rt => &rt::RtClass,
            Self::Fifo => &fifo::FifoClass,
        }
    }

    #[inline]
    pub fn weight(self) -> i32 {
        self.ops().weight()
    }

    /// The weighted priority of `prio` in this class.
    #[inline]
    pub fn wprio(self, prio: i32) -> i32 {
        self.weight() * WEIGHT_FACTOR + prio
    }
}

/// Scheduling parameters of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedParam {
    /// [`SchedClass::Rt`] at the given priority.
    Rt { prio: i32 },
    /// [`SchedClass::Fifo`] at the given priority.
    Fifo { prio: i32 },
    /// [`SchedClass::Fifo`] with round-robin time slicing among threads of
    /// equal priority. A `quantum` of [`Ktime::ZERO`] selects the default
    /// quantum of the core instance.
    Rr { prio: i32, quantum: Ktime },
}

impl SchedParam {
    /// The class these parameters belong to.
    #[inline]
    pub fn class(&self) -> SchedClass {
        match self {
            Self::Rt { .. } => SchedClass::Rt,
            Self::Fifo { .. } | Self::Rr { .. } => SchedClass::Fifo,
        }
    }

    #[inline]
    pub fn prio(&self) -> i32 {
        match *self {
            Self::Rt { prio } | Self::Fifo { prio } | Self::Rr { prio, .. } => prio,
        }
    }
}

/// A priority within a given class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prio {
    pub class: SchedClass,
    pub prio: i32,
}

impl Prio {
    #[inline]
    pub fn wprio(self) -> i32 {
        self.class.wprio(self.prio)
    }
}

pub(crate) mod private {
    pub trait Sealed {}
}

/// The operations a scheduling class implements.
///
/// The queue operations receive the run-queue of the thread's CPU; the
/// parameter operations only touch the thread's priority fields. Neither
/// kind updates the `READY` bit, which is owned by [`State`].
pub trait SchedClassOps: fmt::Debug + Send + Sync + private::Sealed {
    fn name(&self) -> &'static str;

    fn weight(&self) -> i32;

    /// The runnable queue of this class in `rq`.
    fn runnable<'a>(&self, rq: &'a RunQueue) -> &'a MultiLevelQueue;

    fn runnable_mut<'a>(&self, rq: &'a mut RunQueue) -> &'a mut MultiLevelQueue;

    /// Reset the class's state in `rq`.
    fn init(&self, rq: &mut RunQueue) {
        *self.runnable_mut(rq) = MultiLevelQueue::new();
    }

    /// Queue `thread` behind its peers at `prio`.
    fn enqueue(&self, rq: &mut RunQueue, thread: ThreadId, prio: i32) {
        self.runnable_mut(rq).add_tail(thread, prio);
    }

    /// Queue `thread` ahead of its peers at `prio`.
    fn requeue(&self, rq: &mut RunQueue, thread: ThreadId, prio: i32) {
        self.runnable_mut(rq).add_head(thread, prio);
    }

    fn dequeue(&self, rq: &mut RunQueue, thread: ThreadId, prio: i32) {
        let found = self.runnable_mut(rq).remove(thread, prio);
        debug_assert!(found, "{thread:?} is not queued at {prio}");
    }

    /// Remove and return the best candidate of this class.
    fn pick(&self, rq: &mut RunQueue) -> Option<ThreadId> {
        self.runnable_mut(rq).pop_highest()
    }

    /// Move the head of level `prio` behind its peers.
    fn rotate(&self, rq: &mut RunQueue, prio: i32) -> bool {
        self.runnable_mut(rq).rotate_level(prio)
    }

    /// Called on a tick for the running `thread`. Returns `true` if the
    /// thread should yield to its peers.
    fn tick(&self, thread: &ThreadCb) -> bool {
        thread.state.contains(ThreadState::RRB)
    }

    /// Validate `param` for `thread`.
    fn chkparam(&self, thread: &ThreadCb, param: &SchedParam) -> Result<(), BadParamError>;

    /// Apply `param` to the base priority of `thread`. The current priority
    /// follows unless the thread is boosted.
    fn setparam(&self, thread: &mut ThreadCb, param: &SchedParam);

    /// Report the parameters of `thread`, as seen by this class.
    fn getparam(&self, thread: &ThreadCb) -> SchedParam;

    /// Make `thread` inherit `prio` in this class, or revert to its base
    /// priority if `prio` is `None`.
    fn trackprio(&self, thread: &mut ThreadCb, prio: Option<i32>);

    /// Raise `thread` to a priority ceiling expressed on the core scale.
    fn ceilprio(&self, thread: &mut ThreadCb, prio: i32) {
        thread.cprio = self.clamp_ceiling(prio);
    }

    /// The priority a ceiling of `prio` maps to in this class.
    fn clamp_ceiling(&self, prio: i32) -> i32 {
        prio
    }
}

/// Scheduler
impl State {
    /// The thread currently elected to run on `cpu`.
    pub fn current(&self, cpu: usize) -> Option<ThreadId> {
        self.rqs[cpu].curr
    }

    /// Add a runnable thread at the tail of its priority level.
    pub(crate) fn enqueue_thread(&mut self, thread: ThreadId) {
        let cb = self.th(thread);
        debug_assert!(!cb.state.contains(ThreadState::READY));
        let (class, prio, cpu) = (cb.sched_class, cb.cprio, cb.cpu);
        class.ops().enqueue(&mut self.rqs[cpu], thread, prio);
        self.th_mut(thread).state.insert(ThreadState::READY);
    }

    /// Add a runnable thread at the head of its priority level.
    pub(crate) fn requeue_thread(&mut self, thread: ThreadId) {
        let cb = self.th(thread);
        debug_assert!(!cb.state.contains(ThreadState::READY));
        let (class, prio, cpu) = (cb.sched_class, cb.cprio, cb.cpu);
        class.ops().requeue(&mut self.rqs[cpu], thread, prio);
        self.th_mut(thread).state.insert(ThreadState::READY);
    }

    pub(crate) fn dequeue_thread(&mut self, thread: ThreadId) {
        let cb = self.th(thread);
        debug_assert!(cb.state.contains(ThreadState::READY));
        let (class, prio, cpu) = (cb.sched_class, cb.cprio, cb.cpu);
        class.ops().dequeue(&mut self.rqs[cpu], thread, prio);
        self.th_mut(thread).state.remove(ThreadState::READY);
    }

    /// Move `thread` behind its peers and request a rescheduling.
    pub(crate) fn putback_thread(&mut self, thread: ThreadId) {
        if self.th(thread).state.contains(ThreadState::READY) {
            self.dequeue_thread(thread);
        }
        self.enqueue_thread(thread);
        let cpu = self.th(thread).cpu;
        self.rqs[cpu].set_resched();
    }

    /// Elect the next thread to run on `cpu`, removing it from its queue.
    ///
    /// The current thread, if still runnable, competes with the queued
    /// threads ahead of its peers.
    fn pick_next_thread(&mut self, cpu: usize) -> Option<ThreadId> {
        if let Some(curr) = self.rqs[cpu].curr {
            let state = self.th(curr).state;
            if !state.intersects(ThreadState::BLOCK_BITS) && !state.contains(ThreadState::READY) {
                self.requeue_thread(curr);
            }
        }

        let rq = &mut self.rqs[cpu];
        let next = SchedClass::BY_WEIGHT
            .iter()
            .find_map(|class| class.ops().pick(rq))?;
        self.th_mut(next).state.remove(ThreadState::READY);
        Some(next)
    }

    /// Run the scheduler on `cpu` if a rescheduling is pending, and return the
    /// thread elected to run.
    ///
    /// This only updates the bookkeeping. Switching the CPU over to the
    /// elected thread is up to the caller.
    pub fn schedule(&mut self, cpu: usize) -> Option<ThreadId> {
        let rq = &mut self.rqs[cpu];
        if !rq.flags.contains(RqFlags::RESCHED) {
            return rq.curr;
        }
        rq.flags.remove(RqFlags::RESCHED);
        let prev = rq.curr;

        let next = self.pick_next_thread(cpu);

        let rq = &mut self.rqs[cpu];
        rq.curr = next;
        if next != prev {
            rq.nr_switches += 1;
            log::trace!("cpu{cpu}: switching from {prev:?} to {next:?}");
            if let Some(next) = next {
                let cb = self.th_mut(next);
                cb.rrcredit = cb.rrperiod;
            }
        }
        next
    }

    /// Announce a scheduler tick on `cpu`. A running round-robin thread yields
    /// to its peers.
    pub fn sched_tick(&mut self, cpu: usize) {
        let Some(curr) = self.rqs[cpu].curr else {
            return;
        };
        let cb = self.th(curr);
        if cb.state.intersects(ThreadState::BLOCK_BITS) {
            return;
        }
        if cb.sched_class.ops().tick(cb) {
            self.putback_thread(curr);
            let cb = self.th_mut(curr);
            cb.rrcredit = cb.rrperiod;
        }
    }

    /// Charge `elapsed` run time to the round-robin credit of the thread
    /// running on `cpu`, and emulate a tick once the credit is exhausted.
    pub fn account_rr(&mut self, cpu: usize, elapsed: Ktime) {
        let Some(curr) = self.rqs[cpu].curr else {
            return;
        };
        let cb = self.th_mut(curr);
        if !cb.state.contains(ThreadState::RRB) {
            return;
        }
        cb.rrcredit = cb.rrcredit - elapsed;
        if cb.rrcredit == Ktime::ZERO {
            self.sched_tick(cpu);
        }
    }

    /// Rotate the threads of priority level `prio` of `class` on `cpu`.
    ///
    /// If the current thread belongs to that level, it goes behind its queued
    /// peers (if any). Otherwise the head of the level goes to its tail.
    pub fn rotate(&mut self, cpu: usize, class: SchedClass, prio: i32) -> Result<(), RotateError> {
        if cpu >= self.rqs.len() || !(CORE_MIN_PRIO..=CORE_MAX_PRIO).contains(&prio) {
            return Err(BadParamError::BadParam.into());
        }
        if let Some(curr) = self.rqs[cpu].curr {
            let cb = self.th(curr);
            let running = !cb.state.intersects(ThreadState::BLOCK_BITS)
                && !cb.state.contains(ThreadState::READY);
            if running && cb.sched_class == class && cb.cprio == prio {
                if class.ops().runnable(&self.rqs[cpu]).level_len(prio) > 0 {
                    self.putback_thread(curr);
                }
                return Ok(());
            }
        }

        let rq = &mut self.rqs[cpu];
        if class.ops().rotate(rq, prio) {
            rq.set_resched();
        }
        Ok(())
    }

    /// Change the base scheduling parameters of `thread`.
    ///
    /// A boosted thread keeps its boosted priority until the boost is
    /// recomputed, which happens before this method returns. If the thread is
    /// waiting on a priority-ordered channel, its position is updated and the
    /// change propagates along the ownership chain.
    pub fn set_schedparam(
        &mut self,
        thread: ThreadId,
        param: SchedParam,
    ) -> Result<(), SetSchedParamError> {
        let param = self.resolve_param(param);
        let cb = self.thread_cb(thread)?;
        if cb.state.contains(ThreadState::ZOMBIE) {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        let class = param.class();
        class.ops().chkparam(cb, &param)?;

        // The new base priority must not exceed the ceiling of a held
        // priority-protected mutex
        let new_wprio = class.wprio(param.prio());
        for &mutex in cb.owned_mutexes.iter() {
            if let Some(ceiling) = self.mx(mutex).ceiling() {
                if class.wprio(class.ops().clamp_ceiling(ceiling)) < new_wprio {
                    return Err(BadParamError::BadParam.into());
                }
            }
        }

        let old = (cb.sched_class, cb.cprio);
        let ready = cb.state.contains(ThreadState::READY);
        if ready {
            self.dequeue_thread(thread);
        }
        let cb = self.th_mut(thread);
        cb.base_class = class;
        class.ops().setparam(cb, &param);
        if !cb.state.contains(ThreadState::BOOST) {
            cb.sched_class = class;
        }
        if ready {
            self.enqueue_thread(thread);
        }

        self.adjust_boost(thread);

        let cb = self.th(thread);
        log::debug!(
            "{thread:?} ({}): base {:?} {}, current {:?} {}",
            cb.name,
            cb.base_class,
            cb.bprio,
            cb.sched_class,
            cb.cprio
        );
        if (cb.sched_class, cb.cprio) != old {
            let cpu = cb.cpu;
            if cb.wchan.is_some() {
                if let Err(e) = self.adjust_wait_priority(thread, WalkMode::Adjust) {
                    log::warn!("{thread:?}: priority walk failed: {e:?}");
                }
            }
            self.rqs[cpu].set_resched();
        }
        Ok(())
    }

    /// Substitute the default round-robin quantum where `param` asks for it.
    pub(crate) fn resolve_param(&self, param: SchedParam) -> SchedParam {
        match param {
            SchedParam::Rr { prio, quantum } if quantum == Ktime::ZERO => SchedParam::Rr {
                prio,
                quantum: self.cfg.rr_quantum,
            },
            _ => param,
        }
    }

    /// Get the scheduling parameters of `thread`. The reported priority is
    /// the current one, which includes any boost.
    pub fn get_schedparam(&self, thread: ThreadId) -> Option<SchedParam> {
        let cb = self.thread(thread)?;
        Some(cb.sched_class.ops().getparam(cb))
    }

    /// Move `thread` to the priority `boost` designates, or back to its base
    /// priority if `boost` is `None`. Returns `true` if the current priority
    /// changed.
    pub(crate) fn track_priority(&mut self, thread: ThreadId, boost: Option<Boost>) -> bool {
        let cb = self.th(thread);
        let target = match boost {
            None => (cb.base_class, cb.bprio),
            Some(Boost::Inherit(p)) => (p.class, p.prio),
            Some(Boost::Ceiling(c)) => (cb.base_class, cb.base_class.ops().clamp_ceiling(c)),
        };
        if (cb.sched_class, cb.cprio) == target {
            return false;
        }

        let ready = cb.state.contains(ThreadState::READY);
        if ready {
            self.dequeue_thread(thread);
        }
        let cb = self.th_mut(thread);
        let class = target.0;
        cb.sched_class = class;
        match boost {
            None => class.ops().trackprio(cb, None),
            Some(Boost::Inherit(p)) => class.ops().trackprio(cb, Some(p.prio)),
            Some(Boost::Ceiling(c)) => class.ops().ceilprio(cb, c),
        }
        let cpu = cb.cpu;
        log::trace!("{thread:?}: now at {:?} {}", class, cb.cprio);
        if ready {
            self.requeue_thread(thread);
        }
        self.rqs[cpu].set_resched();
        true
    }
}
