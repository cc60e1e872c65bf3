//! Counting semaphores
use core::task::Poll;

use crate::{
    clock::{Ktime, TimeoutMode},
    error::{BadIdError, ObjectError, TryWaitError, WaitError},
    thread::{ThreadId, ThreadInfo},
    utils::define_id,
    wait::{WaitPolicy, WaitQueueId},
    State,
};

define_id! {
    /// Identifies a semaphore.
    pub struct SemId;
}

/// *Semaphore control block*
#[derive(Debug)]
pub struct SemCb {
    gen: u32,
    value: u32,
    wait: WaitQueueId,
}

impl SemCb {
    /// The number of available units.
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn wait_queue(&self) -> WaitQueueId {
        self.wait
    }
}

impl State {
    fn sem_cb(&self, sem: SemId) -> Result<&SemCb, BadIdError> {
        self.sems
            .get(sem.slot())
            .filter(|cb| cb.gen == sem.gen())
            .ok_or(BadIdError::BadId)
    }

    /// Get the control block of `sem`. Returns `None` if the identifier is
    /// stale.
    pub fn sem(&self, sem: SemId) -> Option<&SemCb> {
        self.sem_cb(sem).ok()
    }

    /// Create a semaphore holding `value` units. Waiters are served by
    /// priority.
    pub fn init_sem(&mut self, name: &str, value: u32) -> SemId {
        let wait = self.init_wait(name, WaitPolicy::Prio);
        let gen = self.next_gen();
        let entry = self.sems.vacant_entry();
        let sem = SemId::new(entry.key(), gen);
        entry.insert(SemCb { gen, value, wait });
        sem
    }

    /// Delete `sem`, waking up its waiters with `RMID`. Returns the number of
    /// threads woken up.
    pub fn destroy_sem(&mut self, sem: SemId) -> Result<usize, ObjectError> {
        let wait = self.sem_cb(sem)?.wait;
        self.sems.remove(sem.slot());
        self.destroy_wait(wait)
    }

    /// Take a unit of `sem` if one is available.
    pub fn trydown(&mut self, curr: ThreadId, sem: SemId) -> Result<(), TryWaitError> {
        self.expect_caller(curr)?;
        let cb = self.sem_cb(sem)?;
        if cb.value == 0 {
            return Err(TryWaitError::Again);
        }
        self.sems[sem.slot()].value -= 1;
        Ok(())
    }

    /// Take a unit of `sem`, waiting for one to be released if none is
    /// available.
    ///
    /// Returns `Poll::Pending` if the caller went to sleep; the outcome is
    /// then collected by [`State::wait_result`]. A unit released by
    /// [`State::up`] is handed over directly to the woken waiter.
    pub fn down_timeout(
        &mut self,
        curr: ThreadId,
        sem: SemId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Poll<Result<(), WaitError>> {
        match self.trydown(curr, sem) {
            Ok(()) => return Poll::Ready(Ok(())),
            Err(TryWaitError::Again) => {}
            Err(TryWaitError::BadId) => return Poll::Ready(Err(WaitError::BadId)),
            Err(TryWaitError::BadObjectState) => {
                return Poll::Ready(Err(WaitError::BadObjectState))
            }
        }
        let wait = self.sems[sem.slot()].wait;
        if let Err(e) = self.add_wait_queue(curr, wait, timeout, mode) {
            return Poll::Ready(Err(e));
        }
        if self.th(curr).is_blocked() {
            Poll::Pending
        } else {
            Poll::Ready(self.wait_result(curr))
        }
    }

    /// Release a unit of `sem`, handing it over to the first waiter if
    /// there is one.
    pub fn up(&mut self, sem: SemId) -> Result<Option<ThreadId>, ObjectError> {
        let wait = self.sem_cb(sem)?.wait;
        let woken = self.wake_up_head(wait)?;
        if woken.is_none() {
            let cb = &mut self.sems[sem.slot()];
            cb.value = cb.value.saturating_add(1);
        }
        Ok(woken)
    }

    /// Wake up every waiter of `sem` with `BCAST`, without handing over any
    /// unit. Returns the number of threads woken up.
    pub fn broadcast_sem(&mut self, sem: SemId) -> Result<usize, ObjectError> {
        let wait = self.sem_cb(sem)?.wait;
        self.flush_wait(wait, ThreadInfo::BCAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sched::SchedParam, state::tests::test_state, thread::ThreadAttrs};

    fn spawn(st: &mut State, prio: i32) -> ThreadId {
        let t = st
            .create_thread(ThreadAttrs::new("t", SchedParam::Fifo { prio }))
            .unwrap();
        st.start_thread(t).unwrap();
        t
    }

    #[test]
    fn counting() {
        let (mut st, _clock) = test_state(1);
        let t = spawn(&mut st, 10);
        let s = st.init_sem("s", 2);
        assert_eq!(st.trydown(t, s), Ok(()));
        assert_eq!(
            st.down_timeout(t, s, Ktime::INFINITE, TimeoutMode::Rel),
            Poll::Ready(Ok(()))
        );
        assert_eq!(st.trydown(t, s), Err(TryWaitError::Again));
        assert_eq!(st.up(s), Ok(None));
        assert_eq!(st.sem(s).unwrap().value(), 1);
    }

    #[test]
    fn handoff_and_timeout() {
        let (mut st, clock) = test_state(1);
        let a = spawn(&mut st, 10);
        let b = spawn(&mut st, 20);
        let s = st.init_sem("s", 0);
        assert!(st
            .down_timeout(a, s, Ktime::from_micros(50), TimeoutMode::Rel)
            .is_pending());
        assert!(st
            .down_timeout(b, s, Ktime::INFINITE, TimeoutMode::Rel)
            .is_pending());

        assert_eq!(st.up(s), Ok(Some(b)));
        assert_eq!(st.wait_result(b), Ok(()));
        assert_eq!(st.sem(s).unwrap().value(), 0);

        clock.advance(Ktime::from_micros(50));
        st.expire_timers();
        assert_eq!(st.wait_result(a), Err(WaitError::Timeout));
        assert_eq!(st.destroy_sem(s), Ok(0));
        assert_eq!(st.up(s), Err(ObjectError::BadId));
    }

    #[test]
    fn broadcast() {
        let (mut st, _clock) = test_state(1);
        let s = st.init_sem("s", 0);
        let waiters = [spawn(&mut st, 10), spawn(&mut st, 20)];
        for t in waiters {
            assert!(st
                .down_timeout(t, s, Ktime::INFINITE, TimeoutMode::Rel)
                .is_pending());
        }
        assert_eq!(st.broadcast_sem(s), Ok(2));
        for t in waiters {
            assert_eq!(st.wait_result(t), Ok(()));
            assert!(st.thread(t).unwrap().info().contains(ThreadInfo::BCAST));
        }
        assert_eq!(st.sem(s).unwrap().value(), 0);
        assert_eq!(st.broadcast_sem(s), Ok(0));
    }
}
