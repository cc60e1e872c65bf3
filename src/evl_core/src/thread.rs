//! Threads
use bitflags::bitflags;
use core::task::Poll;

use crate::{
    clock::{Ktime, TimeoutMode},
    error::{
        BadObjectStateError, BadParamError, CallerError, CreateThreadError, ThreadError,
        WaitError,
    },
    mutex::MutexId,
    sched::{SchedClass, SchedParam},
    timeout::TimerKey,
    utils::define_id,
    wait::WaitChannelRef,
    State,
};

define_id! {
    /// Identifies a thread of a core instance.
    pub struct ThreadId;
}

/// The compact thread handle stored in a mutex lock word.
///
/// A fundle occupies the low 30 bits of the word. Zero ([`NO_HANDLE`]) means
/// "no owner".
pub type Fundle = u32;

/// The null [`Fundle`].
pub const NO_HANDLE: Fundle = 0;

/// The bits of a lock word holding a [`Fundle`].
pub const FUNDLE_MASK: u32 = 0x3fff_ffff;

/// The largest number of threads a core instance can hold, as limited by the
/// width of [`Fundle`].
pub const MAX_THREADS: usize = 0xfffe;

impl ThreadId {
    /// The lock word handle of the thread.
    ///
    /// Only the low 14 bits of the generation are kept. Thread generations
    /// are counted apart from other objects, so a slot reused by a new
    /// thread gets a fresh fundle until 16384 more threads have been
    /// created; a lock word left stale for that long may then name the new
    /// thread.
    #[inline]
    pub fn fundle(self) -> Fundle {
        ((self.gen() & 0x3fff) << 16) | (self.slot() as u32 + 1)
    }
}

bitflags! {
    /// Scheduling state bits of a thread.
    pub struct ThreadState: u32 {
        /// Created but not started yet.
        const DORMANT = 1 << 0;
        /// Queued in a run-queue.
        const READY = 1 << 1;
        /// Sleeping on a wait channel.
        const PEND = 1 << 2;
        /// Sleeping on a timer (possibly in addition to `PEND`).
        const DELAY = 1 << 3;
        /// Held by [`State::hold_thread`].
        const SUSP = 1 << 4;
        /// Exited, waiting to be reaped.
        const ZOMBIE = 1 << 5;
        /// Running at a boosted priority.
        const BOOST = 1 << 6;
        /// Time-sliced in round-robin fashion.
        const RRB = 1 << 7;
        /// Backs a user-space thread.
        const USER = 1 << 8;

        /// Any of these prevents the thread from running.
        const BLOCK_BITS = Self::DORMANT.bits
            | Self::PEND.bits
            | Self::DELAY.bits
            | Self::SUSP.bits
            | Self::ZOMBIE.bits;
    }
}

bitflags! {
    /// Wake-up information bits of a thread, describing why its last sleep
    /// ended.
    pub struct ThreadInfo: u32 {
        /// The timeout elapsed.
        const TIMEO = 1 << 0;
        /// The wait channel was removed.
        const RMID = 1 << 1;
        /// The wait was forcibly broken.
        const BREAK = 1 << 2;
        /// Woken up by a broadcast.
        const BCAST = 1 << 3;
        /// Woken up by [`State::kick_thread`].
        const KICKED = 1 << 4;
        /// Granted the resource it was waiting for.
        const WAKEN = 1 << 5;

        /// Cleared whenever the thread goes to sleep.
        const WAKE_BITS = Self::TIMEO.bits
            | Self::RMID.bits
            | Self::BREAK.bits
            | Self::BCAST.bits
            | Self::KICKED.bits
            | Self::WAKEN.bits;
    }
}

/// Creation attributes of a thread.
#[derive(Debug, Clone)]
pub struct ThreadAttrs {
    pub name: String,
    /// The CPU the thread runs on.
    pub cpu: usize,
    /// The initial base scheduling parameters.
    pub param: SchedParam,
    /// Whether the thread backs a user-space thread.
    pub user: bool,
}

impl ThreadAttrs {
    pub fn new(name: impl Into<String>, param: SchedParam) -> Self {
        Self {
            name: name.into(),
            cpu: 0,
            param,
            user: false,
        }
    }

    pub fn cpu(self, cpu: usize) -> Self {
        Self { cpu, ..self }
    }

    pub fn user(self, user: bool) -> Self {
        Self { user, ..self }
    }
}

/// *Thread control block*
#[derive(Debug)]
pub struct ThreadCb {
    pub(crate) gen: u32,
    pub(crate) fundle: Fundle,
    pub(crate) name: String,
    pub(crate) cpu: usize,
    pub(crate) state: ThreadState,
    pub(crate) info: ThreadInfo,

    /// The class set by [`State::set_schedparam`].
    pub(crate) base_class: SchedClass,
    /// The class the thread is currently scheduled in. Differs from
    /// `base_class` while the thread inherits a priority from another class.
    pub(crate) sched_class: SchedClass,
    /// The base priority.
    pub(crate) bprio: i32,
    /// The current priority, including boosts.
    pub(crate) cprio: i32,

    pub(crate) rrperiod: Ktime,
    pub(crate) rrcredit: Ktime,

    /// The channel the thread is pending on. Set iff the thread is linked in
    /// that channel's wait list.
    pub(crate) wchan: Option<WaitChannelRef>,
    pub(crate) timer: Option<TimerKey>,

    /// The mutexes whose ownership by this thread is tracked.
    pub(crate) owned_mutexes: Vec<MutexId>,
    /// The owned mutexes that may boost this thread.
    pub(crate) boosters: Vec<MutexId>,

    /// The host thread to unpark when this thread is resumed.
    pub(crate) host: Option<std::thread::Thread>,
}

impl ThreadCb {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn info(&self) -> ThreadInfo {
        self.info
    }

    pub fn fundle(&self) -> Fundle {
        self.fundle
    }

    pub fn base_class(&self) -> SchedClass {
        self.base_class
    }

    pub fn sched_class(&self) -> SchedClass {
        self.sched_class
    }

    /// The base priority.
    pub fn base_priority(&self) -> i32 {
        self.bprio
    }

    /// The current priority.
    pub fn priority(&self) -> i32 {
        self.cprio
    }

    /// The weighted current priority.
    #[inline]
    pub fn wprio(&self) -> i32 {
        self.sched_class.wprio(self.cprio)
    }

    /// The weighted base priority.
    #[inline]
    pub fn base_wprio(&self) -> i32 {
        self.base_class.wprio(self.bprio)
    }

    pub fn wchan(&self) -> Option<WaitChannelRef> {
        self.wchan
    }

    pub fn owned_mutexes(&self) -> &[MutexId] {
        &self.owned_mutexes
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state.intersects(ThreadState::BLOCK_BITS)
    }
}

/// Thread lifecycle
impl State {
    /// Create a thread in the dormant state.
    pub fn create_thread(&mut self, attrs: ThreadAttrs) -> Result<ThreadId, CreateThreadError> {
        if attrs.cpu >= self.rqs.len() {
            return Err(BadParamError::BadParam.into());
        }
        if self.threads.len() >= self.cfg.max_threads {
            return Err(CreateThreadError::NoMemory);
        }

        let param = self.resolve_param(attrs.param);
        let class = param.class();
        let mut state = ThreadState::DORMANT;
        if attrs.user {
            state |= ThreadState::USER;
        }
        let gen = self.next_thread_gen();
        let mut cb = ThreadCb {
            gen,
            fundle: NO_HANDLE,
            name: attrs.name,
            cpu: attrs.cpu,
            state,
            info: ThreadInfo::empty(),
            base_class: class,
            sched_class: class,
            bprio: 0,
            cprio: 0,
            rrperiod: Ktime::ZERO,
            rrcredit: Ktime::ZERO,
            wchan: None,
            timer: None,
            owned_mutexes: Vec::new(),
            boosters: Vec::new(),
            host: None,
        };
        class.ops().chkparam(&cb, &param)?;
        class.ops().setparam(&mut cb, &param);

        let entry = self.threads.vacant_entry();
        let thread = ThreadId::new(entry.key(), gen);
        cb.fundle = thread.fundle();
        log::debug!("created {thread:?} ({}) with {param:?}", cb.name);
        entry.insert(cb);
        Ok(thread)
    }

    /// Make a dormant thread runnable.
    pub fn start_thread(&mut self, thread: ThreadId) -> Result<(), ThreadError> {
        let cb = self.thread_cb(thread)?;
        if !cb.state.contains(ThreadState::DORMANT) {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        self.resume_thread(thread, ThreadState::DORMANT);
        Ok(())
    }

    /// Check that `thread` exists and can issue a service call.
    pub(crate) fn expect_caller(&self, thread: ThreadId) -> Result<&ThreadCb, CallerError> {
        let cb = self.threads.get(thread.slot()).filter(|cb| cb.gen == thread.gen());
        match cb {
            None => Err(CallerError::BadId),
            Some(cb) if cb.is_blocked() => Err(CallerError::BadObjectState),
            Some(cb) => Ok(cb),
        }
    }

    /// Clear the `mask` bits of `thread`, and make it runnable if no blocking
    /// condition remains.
    pub(crate) fn resume_thread(&mut self, thread: ThreadId, mask: ThreadState) {
        let cb = self.th(thread);
        if !cb.state.intersects(mask) {
            return;
        }
        debug_assert!(!mask.contains(ThreadState::PEND) || cb.wchan.is_none());
        if mask.contains(ThreadState::DELAY) {
            self.cancel_timer(thread);
        }

        let cb = self.th_mut(thread);
        cb.state.remove(mask);
        if cb.is_blocked() {
            return;
        }
        let (cpu, host) = (cb.cpu, cb.host.clone());
        if !cb.state.contains(ThreadState::READY) {
            self.enqueue_thread(thread);
        }
        self.rqs[cpu].set_resched();
        log::trace!("resumed {thread:?}");
        if let Some(host) = host {
            self.woken.push(host);
        }
    }

    /// Put `thread` to sleep, optionally on the channel it was just linked
    /// to. A finite `timeout` arms the thread's timer; a date already passed
    /// times out the wait on the spot. [`Ktime::INFINITE`] only means "no
    /// timeout" in [`TimeoutMode::Rel`].
    pub(crate) fn sleep_on(&mut self, thread: ThreadId, timeout: Ktime, mode: TimeoutMode) {
        let now = self.cfg.clock.read();
        // Only a relative zero means "no timeout"; date zero is in the past
        let deadline = match mode {
            TimeoutMode::Rel if timeout.is_infinite() => None,
            TimeoutMode::Rel => Some(now + timeout),
            TimeoutMode::Abs => Some(timeout),
        };

        self.th_mut(thread).info.remove(ThreadInfo::WAKE_BITS);
        if self.th(thread).state.contains(ThreadState::READY) {
            self.dequeue_thread(thread);
        }

        let cb = self.th_mut(thread);
        if cb.wchan.is_some() {
            cb.state.insert(ThreadState::PEND);
        }
        if deadline.is_some() || cb.wchan.is_none() {
            cb.state.insert(ThreadState::DELAY);
        }
        let cpu = cb.cpu;
        if self.rqs[cpu].curr == Some(thread) {
            self.rqs[cpu].set_resched();
        }
        log::trace!("{thread:?} sleeps until {deadline:?}");

        match deadline {
            Some(at) if at <= now => self.handle_timeout(thread),
            Some(at) => self.arm_timer(thread, at),
            None => {}
        }
    }

    /// Suspend `thread` until [`State::release_thread`] is called. Holding
    /// combines with any wait the thread is sleeping on.
    pub fn hold_thread(&mut self, thread: ThreadId) -> Result<(), ThreadError> {
        let cb = self.thread_cb(thread)?;
        if cb
            .state
            .intersects(ThreadState::DORMANT | ThreadState::ZOMBIE)
        {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        if cb.state.contains(ThreadState::READY) {
            self.dequeue_thread(thread);
        }
        let cb = self.th_mut(thread);
        cb.state.insert(ThreadState::SUSP);
        let cpu = cb.cpu;
        if self.rqs[cpu].curr == Some(thread) {
            self.rqs[cpu].set_resched();
        }
        log::debug!("held {thread:?}");
        Ok(())
    }

    /// Lift the suspension of a held thread.
    pub fn release_thread(&mut self, thread: ThreadId) -> Result<(), ThreadError> {
        let cb = self.thread_cb(thread)?;
        if !cb.state.contains(ThreadState::SUSP) {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        self.resume_thread(thread, ThreadState::SUSP);
        log::debug!("released {thread:?}");
        Ok(())
    }

    /// Break the sleep of `thread`. The interrupted service fails with
    /// `Broken`.
    pub fn kick_thread(&mut self, thread: ThreadId) -> Result<(), ThreadError> {
        let cb = self.thread_cb(thread)?;
        if !cb
            .state
            .intersects(ThreadState::PEND | ThreadState::DELAY)
        {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        self.th_mut(thread)
            .info
            .insert(ThreadInfo::BREAK | ThreadInfo::KICKED);
        if self.th(thread).wchan.is_some() {
            self.abort_wait(thread);
        }
        self.resume_thread(thread, ThreadState::PEND | ThreadState::DELAY);
        log::debug!("kicked {thread:?}");
        Ok(())
    }

    /// Put the calling thread to sleep for `timeout`. An infinite timeout
    /// sleeps until the thread is kicked.
    ///
    /// Returns `Poll::Pending` if the thread went to sleep, in which case the
    /// outcome is collected by [`State::complete_delay`] once it is resumed.
    pub fn delay_thread(
        &mut self,
        curr: ThreadId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Poll<Result<(), WaitError>> {
        if let Err(e) = self.expect_caller(curr) {
            return Poll::Ready(Err(e.into()));
        }
        self.sleep_on(curr, timeout, mode);
        if self.th(curr).is_blocked() {
            Poll::Pending
        } else {
            Poll::Ready(self.complete_delay(curr))
        }
    }

    /// Collect the outcome of [`State::delay_thread`]. Expiry of the delay is
    /// a success.
    pub fn complete_delay(&self, curr: ThreadId) -> Result<(), WaitError> {
        match self.wait_result(curr) {
            Err(WaitError::Timeout) => Ok(()),
            result => result,
        }
    }

    /// Terminate `thread`. Its wait is aborted, and the mutexes it owns are
    /// released (handed over to their next waiters). The thread becomes a
    /// zombie until [`State::reap_thread`] is called.
    pub fn exit_thread(&mut self, thread: ThreadId) -> Result<(), ThreadError> {
        let cb = self.thread_cb(thread)?;
        if cb.state.contains(ThreadState::ZOMBIE) {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        let fundle = cb.fundle;

        if cb.wchan.is_some() {
            self.th_mut(thread).info.insert(ThreadInfo::BREAK);
            self.abort_wait(thread);
        }
        self.cancel_timer(thread);
        if self.th(thread).state.contains(ThreadState::READY) {
            self.dequeue_thread(thread);
        }

        for mutex in self.mutexes_owned_by(fundle) {
            log::debug!("{thread:?} exits while holding {mutex:?}");
            self.release_mutex(thread, mutex);
        }

        let cb = self.th_mut(thread);
        debug_assert!(cb.owned_mutexes.is_empty());
        cb.boosters.clear();
        cb.state = (cb.state & ThreadState::USER) | ThreadState::ZOMBIE;
        cb.sched_class = cb.base_class;
        cb.cprio = cb.bprio;
        cb.wchan = None;
        let (cpu, host) = (cb.cpu, cb.host.take());
        if self.rqs[cpu].curr == Some(thread) {
            self.rqs[cpu].set_resched();
        }
        if let Some(host) = host {
            self.woken.push(host);
        }
        log::debug!("{thread:?} exited");
        Ok(())
    }

    /// Delete a zombie or dormant thread.
    pub fn reap_thread(&mut self, thread: ThreadId) -> Result<(), ThreadError> {
        let cb = self.thread_cb(thread)?;
        if !cb
            .state
            .intersects(ThreadState::ZOMBIE | ThreadState::DORMANT)
        {
            return Err(BadObjectStateError::BadObjectState.into());
        }
        debug_assert!(cb.owned_mutexes.is_empty() && cb.wchan.is_none());
        self.cancel_timer(thread);
        self.threads.remove(thread.slot());
        for rq in self.rqs.iter_mut() {
            if rq.curr == Some(thread) {
                rq.curr = None;
                rq.set_resched();
            }
        }
        log::debug!("reaped {thread:?}");
        Ok(())
    }

    /// Find the thread a lock word handle designates.
    pub fn thread_by_fundle(&self, fundle: Fundle) -> Option<ThreadId> {
        let slot = ((fundle & 0xffff) as usize).checked_sub(1)?;
        let cb = self.threads.get(slot)?;
        (cb.fundle == fundle).then(|| ThreadId::new(slot, cb.gen))
    }

    /// Register the host thread to unpark when `thread` is resumed.
    pub(crate) fn attach_host(&mut self, thread: ThreadId, host: Option<std::thread::Thread>) {
        if let Ok(cb) = self.thread_cb_mut(thread) {
            cb.host = host;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ThreadError, state::tests::test_state};

    fn fifo(name: &str, prio: i32) -> ThreadAttrs {
        ThreadAttrs::new(name, SchedParam::Fifo { prio })
    }

    #[test]
    fn start_and_schedule() {
        let (mut st, _clock) = test_state(1);
        let t1 = st.create_thread(fifo("t1", 10)).unwrap();
        let t2 = st.create_thread(fifo("t2", 20)).unwrap();
        assert!(st.thread(t1).unwrap().state().contains(ThreadState::DORMANT));
        assert_eq!(st.schedule(0), None);

        st.start_thread(t1).unwrap();
        assert_eq!(st.schedule(0), Some(t1));
        st.start_thread(t2).unwrap();
        assert_eq!(st.schedule(0), Some(t2));
        // `t1` was preempted, it goes back to the head of its level
        assert!(st.thread(t1).unwrap().state().contains(ThreadState::READY));
        assert!(!st.thread(t2).unwrap().state().contains(ThreadState::READY));
        assert_eq!(st.start_thread(t2), Err(ThreadError::BadObjectState));
    }

    #[test]
    fn user_fifo_range() {
        let (mut st, _clock) = test_state(1);
        assert_eq!(
            st.create_thread(fifo("u", 100).user(true)).err(),
            Some(CreateThreadError::BadParam)
        );
        assert_eq!(
            st.create_thread(fifo("u", 0).user(true)).err(),
            Some(CreateThreadError::BadParam)
        );
        st.create_thread(fifo("u", 99).user(true)).unwrap();
        st.create_thread(fifo("k", 101)).unwrap();
        assert_eq!(
            st.create_thread(fifo("k", 1).cpu(1)).err(),
            Some(CreateThreadError::BadParam)
        );
    }

    #[test]
    fn hold_and_release() {
        let (mut st, _clock) = test_state(1);
        let t = st.create_thread(fifo("t", 10)).unwrap();
        assert_eq!(st.hold_thread(t), Err(ThreadError::BadObjectState));
        st.start_thread(t).unwrap();
        assert_eq!(st.schedule(0), Some(t));
        st.hold_thread(t).unwrap();
        assert_eq!(st.schedule(0), None);
        st.release_thread(t).unwrap();
        assert_eq!(st.schedule(0), Some(t));
        assert_eq!(st.release_thread(t), Err(ThreadError::BadObjectState));
    }

    #[test]
    fn delay_expires() {
        let (mut st, clock) = test_state(1);
        let t = st.create_thread(fifo("t", 10)).unwrap();
        st.start_thread(t).unwrap();
        st.schedule(0);

        let res = st.delay_thread(t, Ktime::from_micros(10), TimeoutMode::Rel);
        assert!(res.is_pending());
        assert_eq!(clock.next_shot(), Some(Ktime::from_micros(10)));
        assert_eq!(st.schedule(0), None);

        clock.advance(Ktime::from_micros(9));
        assert_eq!(st.expire_timers(), 0);
        clock.advance(Ktime::from_micros(1));
        assert_eq!(st.expire_timers(), 1);
        assert_eq!(clock.next_shot(), None);
        assert_eq!(st.schedule(0), Some(t));
        assert_eq!(st.complete_delay(t), Ok(()));
    }

    #[test]
    fn delay_with_past_date_returns_at_once() {
        let (mut st, clock) = test_state(1);
        clock.set(Ktime::from_millis(1));
        let t = st.create_thread(fifo("t", 10)).unwrap();
        st.start_thread(t).unwrap();
        let res = st.delay_thread(t, Ktime::from_micros(5), TimeoutMode::Abs);
        assert_eq!(res, Poll::Ready(Ok(())));
        assert_eq!(st.nr_timers(), 0);
    }

    #[test]
    fn absolute_date_zero_is_past() {
        let (mut st, clock) = test_state(1);
        clock.set(Ktime::from_millis(1));
        let t = st.create_thread(fifo("t", 10)).unwrap();
        st.start_thread(t).unwrap();

        let res = st.delay_thread(t, Ktime::ZERO, TimeoutMode::Abs);
        assert_eq!(res, Poll::Ready(Ok(())));
        assert!(st.thread(t).unwrap().info().contains(ThreadInfo::TIMEO));
        assert!(!st.thread(t).unwrap().is_blocked());
        assert_eq!(st.nr_timers(), 0);

        // Relative zero still waits without a timeout
        assert!(st
            .delay_thread(t, Ktime::INFINITE, TimeoutMode::Rel)
            .is_pending());
        assert_eq!(st.thread_timeout(t), None);
    }

    #[test]
    fn kick_breaks_delay() {
        let (mut st, _clock) = test_state(1);
        let t = st.create_thread(fifo("t", 10)).unwrap();
        st.start_thread(t).unwrap();
        assert!(st
            .delay_thread(t, Ktime::INFINITE, TimeoutMode::Rel)
            .is_pending());
        assert_eq!(
            st.delay_thread(t, Ktime::INFINITE, TimeoutMode::Rel),
            Poll::Ready(Err(WaitError::BadObjectState))
        );
        st.kick_thread(t).unwrap();
        assert!(st
            .thread(t)
            .unwrap()
            .info()
            .contains(ThreadInfo::BREAK | ThreadInfo::KICKED));
        assert_eq!(st.complete_delay(t), Err(WaitError::Broken));
        assert_eq!(st.kick_thread(t), Err(ThreadError::BadObjectState));
    }

    #[test]
    fn exit_and_reap() {
        let (mut st, _clock) = test_state(1);
        let t = st.create_thread(fifo("t", 10)).unwrap();
        st.start_thread(t).unwrap();
        assert_eq!(st.schedule(0), Some(t));
        assert_eq!(st.reap_thread(t), Err(ThreadError::BadObjectState));
        st.exit_thread(t).unwrap();
        assert_eq!(st.schedule(0), None);
        assert_eq!(st.exit_thread(t), Err(ThreadError::BadObjectState));
        st.reap_thread(t).unwrap();
        assert!(st.thread(t).is_none());
        assert_eq!(st.start_thread(t), Err(ThreadError::BadId));

        // The slot is reused by a thread with a different identity
        let t2 = st.create_thread(fifo("t2", 10)).unwrap();
        assert_ne!(t, t2);
        assert_ne!(t.fundle(), t2.fundle());
        assert_eq!(st.thread_by_fundle(t.fundle()), None);
        assert_eq!(st.thread_by_fundle(t2.fundle()), Some(t2));
    }

    #[test]
    fn fundle_ignores_other_objects() {
        let (mut st, _clock) = test_state(1);
        let t = st.create_thread(fifo("t", 10)).unwrap();
        st.start_thread(t).unwrap();
        st.exit_thread(t).unwrap();
        st.reap_thread(t).unwrap();

        // Enough other objects to wrap a shared 14-bit generation
        for _ in 0..0x3fff {
            st.init_wait("wq", crate::wait::WaitPolicy::Fifo);
        }
        let t2 = st.create_thread(fifo("t2", 10)).unwrap();
        assert_eq!(t2.slot(), t.slot());
        assert_ne!(t2.fundle(), t.fundle());
        assert_eq!(st.thread_by_fundle(t.fundle()), None);
    }

    #[test]
    fn fundle_layout() {
        let t = ThreadId::new(0, 1);
        assert_eq!(t.fundle(), 0x0001_0001);
        let t = ThreadId::new(MAX_THREADS - 1, 0x7fff);
        assert_eq!(t.fundle() & !FUNDLE_MASK, 0);
        assert_ne!(t.fundle(), NO_HANDLE);
    }
}
