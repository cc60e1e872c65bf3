//! Wait channels and wait queues
//!
//! A *wait channel* is anything a thread can sleep on: a plain wait queue, or
//! a mutex. Each channel keeps its sleepers in a list ordered either by
//! arrival ([`WaitPolicy::Fifo`]) or by weighted priority
//! ([`WaitPolicy::Prio`]). A thread pending on a channel records it in its
//! `wchan` field, which the channel-specific hooks (abort, reorder, follow
//! the ownership dependency) are dispatched on.
use core::fmt;
use std::collections::VecDeque;

use crate::{
    clock::{Ktime, TimeoutMode},
    error::{BadIdError, ChainError, ObjectError, WaitError},
    mutex::MutexId,
    thread::{ThreadId, ThreadInfo, ThreadState},
    utils::define_id,
    State,
};

define_id! {
    /// Identifies a wait queue.
    pub struct WaitQueueId;
}

/// Specifies the sorting order of a wait list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Sleepers are woken up in arrival order.
    Fifo,
    /// Sleepers are woken up by decreasing weighted priority, in arrival
    /// order among equals.
    Prio,
}

/// The sleeper list of a wait channel.
#[derive(Debug)]
pub struct WaitChannel {
    wait_list: VecDeque<ThreadId>,
    policy: WaitPolicy,
}

impl WaitChannel {
    pub(crate) fn new(policy: WaitPolicy) -> Self {
        Self {
            wait_list: VecDeque::new(),
            policy,
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// The sleeper to be woken up first.
    pub fn head(&self) -> Option<ThreadId> {
        self.wait_list.front().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.wait_list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.wait_list.len()
    }

    /// Iterate over the sleepers in wake-up order.
    pub fn waiters(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.wait_list.iter().copied()
    }

    fn contains(&self, thread: ThreadId) -> bool {
        self.wait_list.contains(&thread)
    }
}

/// Refers to the wait channel a thread is pending on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitChannelRef {
    Queue(WaitQueueId),
    Mutex(MutexId),
}

/// The mode of a priority walk along an ownership chain
/// ([`State::adjust_wait_priority`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Re-sort each waiter in its channel and update the boost of each owner,
    /// stopping at the first owner whose priority is unaffected.
    Adjust,
    /// Like `Adjust`, but walk to the end of the chain regardless.
    Reset,
    /// Verify the chain without modifying anything.
    Check,
}

/// *Wait queue control block*
pub struct WaitQueueCb {
    gen: u32,
    name: String,
    pub(crate) chan: WaitChannel,
}

impl fmt::Debug for WaitQueueCb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WaitQueueCb")
            .field("self", &(self as *const _))
            .field("name", &self.name)
            .field("chan", &self.chan)
            .finish()
    }
}

impl WaitQueueCb {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &WaitChannel {
        &self.chan
    }
}

/// Wait channel plumbing
impl State {
    pub(crate) fn channel(&self, wchan: WaitChannelRef) -> &WaitChannel {
        match wchan {
            WaitChannelRef::Queue(wq) => &self.wq(wq).chan,
            WaitChannelRef::Mutex(mutex) => &self.mx(mutex).chan,
        }
    }

    pub(crate) fn channel_mut(&mut self, wchan: WaitChannelRef) -> &mut WaitChannel {
        match wchan {
            WaitChannelRef::Queue(wq) => &mut self.wq_mut(wq).chan,
            WaitChannelRef::Mutex(mutex) => &mut self.mx_mut(mutex).chan,
        }
    }

    /// Find where `thread` goes in the wait list of `wchan`.
    fn insert_pos(&self, wchan: WaitChannelRef, thread: ThreadId) -> usize {
        let chan = self.channel(wchan);
        match chan.policy {
            WaitPolicy::Fifo => chan.wait_list.len(),
            WaitPolicy::Prio => {
                // Insert before the first waiter with a strictly lower
                // priority
                let wprio = self.th(thread).wprio();
                chan.wait_list
                    .iter()
                    .position(|&t| self.th(t).wprio() < wprio)
                    .unwrap_or(chan.wait_list.len())
            }
        }
    }

    /// Link `thread` to the wait list of `wchan`.
    pub(crate) fn link_waiter(&mut self, wchan: WaitChannelRef, thread: ThreadId) {
        debug_assert!(self.th(thread).wchan.is_none());
        let pos = self.insert_pos(wchan, thread);
        self.channel_mut(wchan).wait_list.insert(pos, thread);
        self.th_mut(thread).wchan = Some(wchan);
    }

    /// Unlink `thread` from the wait list of `wchan`.
    pub(crate) fn unlink_waiter(&mut self, wchan: WaitChannelRef, thread: ThreadId) -> bool {
        let list = &mut self.channel_mut(wchan).wait_list;
        let Some(pos) = list.iter().position(|&t| t == thread) else {
            return false;
        };
        list.remove(pos);
        self.th_mut(thread).wchan = None;
        true
    }

    /// Unlink and return the head of the wait list of `wchan`.
    pub(crate) fn pop_waiter(&mut self, wchan: WaitChannelRef) -> Option<ThreadId> {
        let thread = self.channel_mut(wchan).wait_list.pop_front()?;
        self.th_mut(thread).wchan = None;
        Some(thread)
    }

    /// Remove `thread` from the channel it is pending on. Resuming the thread
    /// is up to the caller.
    pub(crate) fn abort_wait(&mut self, thread: ThreadId) {
        match self.th(thread).wchan {
            None => {}
            Some(wchan @ WaitChannelRef::Queue(_)) => {
                self.unlink_waiter(wchan, thread);
            }
            Some(WaitChannelRef::Mutex(mutex)) => self.abort_mutex_wait(mutex, thread),
        }
    }

    /// Re-sort `thread` in the wait list of `wchan` after a priority change.
    fn reorder_wait(&mut self, wchan: WaitChannelRef, thread: ThreadId) {
        if self.channel(wchan).policy != WaitPolicy::Prio {
            return;
        }
        let list = &mut self.channel_mut(wchan).wait_list;
        if let Some(pos) = list.iter().position(|&t| t == thread) {
            list.remove(pos);
            let pos = self.insert_pos(wchan, thread);
            self.channel_mut(wchan).wait_list.insert(pos, thread);
        }
    }

    /// Propagate a priority change of a waiter to the thread the channel
    /// depends on. Returns that thread if the walk should continue with it.
    fn follow_depend(
        &mut self,
        wchan: WaitChannelRef,
        originator: ThreadId,
        mode: WalkMode,
    ) -> Result<Option<ThreadId>, ChainError> {
        match wchan {
            WaitChannelRef::Queue(_) => Ok(None),
            WaitChannelRef::Mutex(mutex) => self.follow_mutex_depend(mutex, originator, mode),
        }
    }

    /// Check that the wait list of `wchan` is sorted as its policy requires.
    fn check_wait_order(&self, wchan: WaitChannelRef) -> Result<(), ChainError> {
        let chan = self.channel(wchan);
        if chan.policy == WaitPolicy::Prio {
            let sorted = chan
                .wait_list
                .iter()
                .zip(chan.wait_list.iter().skip(1))
                .all(|(&a, &b)| self.th(a).wprio() >= self.th(b).wprio());
            if !sorted {
                return Err(ChainError::BadObjectState);
            }
        }
        Ok(())
    }

    /// Walk the ownership chain starting at the channel `thread` is pending
    /// on, after the priority of `thread` changed.
    ///
    /// Each hop re-sorts the waiter in its channel and lets the channel update
    /// the boost of the thread it depends on (the owner of a mutex). The walk
    /// is bounded by the number of threads. A chain leading back to `thread`
    /// yields `WouldDeadlock`.
    pub fn adjust_wait_priority(
        &mut self,
        thread: ThreadId,
        mode: WalkMode,
    ) -> Result<(), ChainError> {
        let mut waiter = thread;
        for _ in 0..=self.threads.len() {
            let Some(wchan) = self.th(waiter).wchan else {
                return Ok(());
            };
            match mode {
                WalkMode::Check => self.check_wait_order(wchan)?,
                WalkMode::Adjust | WalkMode::Reset => self.reorder_wait(wchan, waiter),
            }
            match self.follow_depend(wchan, thread, mode)? {
                Some(next) => waiter = next,
                None => return Ok(()),
            }
        }
        log::warn!("{thread:?}: ownership chain does not terminate");
        Err(ChainError::WouldDeadlock)
    }
}

/// Wait queues
impl State {
    pub(crate) fn wq_cb(&self, wq: WaitQueueId) -> Result<&WaitQueueCb, BadIdError> {
        self.wait_queues
            .get(wq.slot())
            .filter(|cb| cb.gen == wq.gen())
            .ok_or(BadIdError::BadId)
    }

    #[inline]
    pub(crate) fn wq(&self, wq: WaitQueueId) -> &WaitQueueCb {
        &self.wait_queues[wq.slot()]
    }

    #[inline]
    pub(crate) fn wq_mut(&mut self, wq: WaitQueueId) -> &mut WaitQueueCb {
        &mut self.wait_queues[wq.slot()]
    }

    /// Get the control block of `wq`. Returns `None` if the identifier is
    /// stale.
    pub fn wait_queue(&self, wq: WaitQueueId) -> Option<&WaitQueueCb> {
        self.wq_cb(wq).ok()
    }

    /// Create a wait queue.
    pub fn init_wait(&mut self, name: &str, policy: WaitPolicy) -> WaitQueueId {
        let gen = self.next_gen();
        let entry = self.wait_queues.vacant_entry();
        let wq = WaitQueueId::new(entry.key(), gen);
        entry.insert(WaitQueueCb {
            gen,
            name: name.to_owned(),
            chan: WaitChannel::new(policy),
        });
        log::trace!("created {wq:?} ({name}, {policy:?})");
        wq
    }

    /// Wake up every sleeper of `wq` with `RMID`, then delete it. Returns the
    /// number of threads woken up.
    pub fn destroy_wait(&mut self, wq: WaitQueueId) -> Result<usize, ObjectError> {
        let count = self.flush_wait(wq, ThreadInfo::RMID)?;
        self.wait_queues.remove(wq.slot());
        log::trace!("destroyed {wq:?}, {count} sleeper(s) woken up");
        Ok(count)
    }

    /// Put the calling thread to sleep on `wq`.
    ///
    /// The thread is normally blocked on return; the outcome of the wait is
    /// collected by [`State::wait_result`] once it is resumed. If `timeout`
    /// designates a date already passed, the wait times out immediately and
    /// the thread remains runnable.
    pub fn add_wait_queue(
        &mut self,
        curr: ThreadId,
        wq: WaitQueueId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Result<(), WaitError> {
        self.expect_caller(curr)?;
        self.wq_cb(wq)?;
        self.link_waiter(WaitChannelRef::Queue(wq), curr);
        self.sleep_on(curr, timeout, mode);
        Ok(())
    }

    /// Wake up a sleeper of `wq`, marking it with `reason`. `waiter` selects
    /// a specific sleeper; `None` selects the head of the list. Returns the
    /// thread woken up, if any.
    pub fn wake_up(
        &mut self,
        wq: WaitQueueId,
        waiter: Option<ThreadId>,
        reason: ThreadInfo,
    ) -> Result<Option<ThreadId>, ObjectError> {
        let cb = self.wq_cb(wq)?;
        let thread = match waiter {
            None => cb.chan.head(),
            Some(t) => cb.chan.contains(t).then(|| t),
        };
        let Some(thread) = thread else {
            return Ok(None);
        };
        self.unlink_waiter(WaitChannelRef::Queue(wq), thread);
        self.th_mut(thread).info.insert(reason);
        self.resume_thread(thread, ThreadState::PEND | ThreadState::DELAY);
        Ok(Some(thread))
    }

    /// Wake up the head of `wq`.
    pub fn wake_up_head(&mut self, wq: WaitQueueId) -> Result<Option<ThreadId>, ObjectError> {
        self.wake_up(wq, None, ThreadInfo::WAKEN)
    }

    /// Wake up every sleeper of `wq`, marking each with `reason`. Returns the
    /// number of threads woken up.
    pub fn flush_wait(&mut self, wq: WaitQueueId, reason: ThreadInfo) -> Result<usize, ObjectError> {
        self.wq_cb(wq)?;
        let mut count = 0;
        while let Some(thread) = self.pop_waiter(WaitChannelRef::Queue(wq)) {
            self.th_mut(thread).info.insert(reason);
            self.resume_thread(thread, ThreadState::PEND | ThreadState::DELAY);
            count += 1;
        }
        Ok(count)
    }

    /// Get a flag indicating whether `wq` has sleepers.
    pub fn wait_active(&self, wq: WaitQueueId) -> Result<bool, ObjectError> {
        Ok(!self.wq_cb(wq)?.chan.is_empty())
    }

    /// The sleeper of `wq` to be woken up first.
    pub fn wait_head(&self, wq: WaitQueueId) -> Result<Option<ThreadId>, ObjectError> {
        Ok(self.wq_cb(wq)?.chan.head())
    }

    /// The sleepers of `wq` in wake-up order.
    pub fn waiters(&self, wq: WaitQueueId) -> Result<Vec<ThreadId>, ObjectError> {
        Ok(self.wq_cb(wq)?.chan.waiters().collect())
    }

    /// Translate the wake-up information of a thread resumed from a wait into
    /// the outcome of that wait.
    pub fn wait_result(&self, thread: ThreadId) -> Result<(), WaitError> {
        let cb = self.thread_cb(thread)?;
        if cb.is_blocked() {
            return Err(WaitError::BadObjectState);
        }
        if cb.info.contains(ThreadInfo::RMID) {
            Err(WaitError::Removed)
        } else if cb.info.contains(ThreadInfo::TIMEO) {
            Err(WaitError::Timeout)
        } else if cb.info.contains(ThreadInfo::BREAK) {
            Err(WaitError::Broken)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sched::SchedParam,
        state::tests::test_state,
        thread::ThreadAttrs,
    };
    use quickcheck_macros::quickcheck;

    fn spawn(st: &mut State, name: &str, param: SchedParam) -> ThreadId {
        let t = st.create_thread(ThreadAttrs::new(name, param)).unwrap();
        st.start_thread(t).unwrap();
        t
    }

    #[test]
    fn fifo_order_and_flush() {
        let (mut st, _clock) = test_state(1);
        let wq = st.init_wait("wq", WaitPolicy::Fifo);
        let ts: Vec<_> = [10, 30, 20]
            .iter()
            .map(|&prio| spawn(&mut st, "t", SchedParam::Fifo { prio }))
            .collect();
        for &t in &ts {
            st.add_wait_queue(t, wq, Ktime::INFINITE, TimeoutMode::Rel)
                .unwrap();
            assert!(st.thread(t).unwrap().state().contains(ThreadState::PEND));
        }
        assert_eq!(st.waiters(wq).unwrap(), ts);
        assert_eq!(st.wait_head(wq), Ok(Some(ts[0])));

        assert_eq!(st.destroy_wait(wq), Ok(3));
        for &t in &ts {
            assert_eq!(st.wait_result(t), Err(WaitError::Removed));
            assert_eq!(st.thread(t).unwrap().wchan(), None);
        }
        assert_eq!(st.wait_active(wq), Err(ObjectError::BadId));
    }

    #[test]
    fn prio_order() {
        let (mut st, _clock) = test_state(1);
        let wq = st.init_wait("wq", WaitPolicy::Prio);
        let low = spawn(&mut st, "low", SchedParam::Fifo { prio: 10 });
        let high = spawn(&mut st, "high", SchedParam::Fifo { prio: 30 });
        let mid1 = spawn(&mut st, "mid1", SchedParam::Fifo { prio: 20 });
        let mid2 = spawn(&mut st, "mid2", SchedParam::Fifo { prio: 20 });
        let rt = spawn(&mut st, "rt", SchedParam::Rt { prio: 1 });
        for t in [low, high, mid1, mid2, rt] {
            st.add_wait_queue(t, wq, Ktime::INFINITE, TimeoutMode::Rel)
                .unwrap();
        }
        assert_eq!(st.waiters(wq).unwrap(), [rt, high, mid1, mid2, low]);

        assert_eq!(st.wake_up_head(wq), Ok(Some(rt)));
        assert_eq!(st.wait_result(rt), Ok(()));
        assert_eq!(
            st.wake_up(wq, Some(mid2), ThreadInfo::BREAK),
            Ok(Some(mid2))
        );
        assert_eq!(st.wait_result(mid2), Err(WaitError::Broken));
        assert_eq!(st.wake_up(wq, Some(rt), ThreadInfo::WAKEN), Ok(None));
        assert_eq!(st.waiters(wq).unwrap(), [high, mid1, low]);

        // Raising a sleeper moves it ahead
        st.set_schedparam(low, SchedParam::Fifo { prio: 40 }).unwrap();
        assert_eq!(st.waiters(wq).unwrap(), [low, high, mid1]);
        assert_eq!(st.adjust_wait_priority(low, WalkMode::Check), Ok(()));
    }

    #[test]
    fn timeout() {
        let (mut st, clock) = test_state(1);
        let wq = st.init_wait("wq", WaitPolicy::Prio);
        let t = spawn(&mut st, "t", SchedParam::Fifo { prio: 10 });
        st.add_wait_queue(t, wq, Ktime::from_micros(100), TimeoutMode::Rel)
            .unwrap();
        assert_eq!(st.wait_result(t), Err(WaitError::BadObjectState));
        clock.advance(Ktime::from_micros(100));
        assert_eq!(st.expire_timers(), 1);
        assert_eq!(st.wait_result(t), Err(WaitError::Timeout));
        assert_eq!(st.wait_active(wq), Ok(false));
    }

    #[test]
    fn bad_caller() {
        let (mut st, _clock) = test_state(1);
        let wq = st.init_wait("wq", WaitPolicy::Fifo);
        let dormant = st
            .create_thread(ThreadAttrs::new("t", SchedParam::Fifo { prio: 1 }))
            .unwrap();
        assert_eq!(
            st.add_wait_queue(dormant, wq, Ktime::INFINITE, TimeoutMode::Rel),
            Err(WaitError::BadObjectState)
        );
        st.start_thread(dormant).unwrap();
        st.destroy_wait(wq).unwrap();
        assert_eq!(
            st.add_wait_queue(dormant, wq, Ktime::INFINITE, TimeoutMode::Rel),
            Err(WaitError::BadId)
        );
    }

    /// Threads leave a priority-ordered queue by decreasing priority, in
    /// arrival order among equals.
    #[quickcheck]
    fn prio_wake_order(prios: Vec<u8>) {
        let (mut st, _clock) = test_state(1);
        let wq = st.init_wait("wq", WaitPolicy::Prio);
        let sleepers: Vec<(i32, ThreadId)> = prios
            .iter()
            .take(64)
            .map(|&p| {
                let prio = 1 + p as i32 % 99;
                let t = spawn(&mut st, "t", SchedParam::Fifo { prio });
                st.add_wait_queue(t, wq, Ktime::INFINITE, TimeoutMode::Rel)
                    .unwrap();
                (prio, t)
            })
            .collect();

        let mut expected = sleepers.clone();
        // stable sort keeps arrival order among equals
        expected.sort_by(|a, b| b.0.cmp(&a.0));

        let mut got = Vec::new();
        while let Some(t) = st.wake_up_head(wq).unwrap() {
            got.push(t);
        }
        let expected: Vec<_> = expected.into_iter().map(|(_, t)| t).collect();
        assert_eq!(got, expected);
    }
}
