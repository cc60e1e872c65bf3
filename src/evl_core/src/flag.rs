//! Event flags
//!
//! A flag is a binary event built on a wait queue. Raising a flag wakes up
//! its first waiter, or latches the event if nobody is waiting; the next wait
//! then consumes it without blocking.
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
    /// Identifies an event flag.
    pub struct FlagId;
}

/// *Flag control block*
#[derive(Debug)]
pub struct FlagCb {
    gen: u32,
    raised: bool,
    wait: WaitQueueId,
}

impl FlagCb {
    /// Get a flag indicating whether the event is latched.
    pub fn is_raised(&self) -> bool {
        self.raised
    }

    /// The wait queue the waiters sleep on.
    pub fn wait_queue(&self) -> WaitQueueId {
        self.wait
    }
}

impl State {
    fn flag_cb(&self, flag: FlagId) -> Result<&FlagCb, BadIdError> {
        self.flags
            .get(flag.slot())
            .filter(|cb| cb.gen == flag.gen())
            .ok_or(BadIdError::BadId)
    }

    /// Get the control block of `flag`. Returns `None` if the identifier is
    /// stale.
    pub fn flag(&self, flag: FlagId) -> Option<&FlagCb> {
        self.flag_cb(flag).ok()
    }

    /// Create an event flag in the lowered state.
    pub fn init_flag(&mut self, name: &str) -> FlagId {
        let wait = self.init_wait(name, WaitPolicy::Prio);
        let gen = self.next_gen();
        let entry = self.flags.vacant_entry();
        let flag = FlagId::new(entry.key(), gen);
        entry.insert(FlagCb {
            gen,
            raised: false,
            wait,
        });
        flag
    }

    /// Delete `flag`, waking up its waiters with `RMID`. Returns the number
    /// of threads woken up.
    pub fn destroy_flag(&mut self, flag: FlagId) -> Result<usize, ObjectError> {
        let wait = self.flag_cb(flag)?.wait;
        self.flags.remove(flag.slot());
        self.destroy_wait(wait)
    }

    /// Consume the event of `flag` if it is raised.
    pub fn trywait_flag(&mut self, curr: ThreadId, flag: FlagId) -> Result<(), TryWaitError> {
        self.expect_caller(curr)?;
        let cb = self.flag_cb(flag)?;
        if !cb.raised {
            return Err(TryWaitError::Again);
        }
        self.flags[flag.slot()].raised = false;
        Ok(())
    }

    /// Wait for `flag` to be raised, consuming the event.
    ///
    /// Returns `Poll::Pending` if the caller went to sleep; the outcome is
    /// then collected by [`State::wait_result`].
    pub fn wait_flag_timeout(
        &mut self,
        curr: ThreadId,
        flag: FlagId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Poll<Result<(), WaitError>> {
        match self.trywait_flag(curr, flag) {
            Ok(()) => return Poll::Ready(Ok(())),
            Err(TryWaitError::Again) => {}
            Err(TryWaitError::BadId) => return Poll::Ready(Err(WaitError::BadId)),
            Err(TryWaitError::BadObjectState) => {
                return Poll::Ready(Err(WaitError::BadObjectState))
            }
        }
        let wait = self.flags[flag.slot()].wait;
        if let Err(e) = self.add_wait_queue(curr, wait, timeout, mode) {
            return Poll::Ready(Err(e));
        }
        if self.th(curr).is_blocked() {
            Poll::Pending
        } else {
            Poll::Ready(self.wait_result(curr))
        }
    }

    /// Raise `flag`. The first waiter, if any, consumes the event right away.
    /// Returns the thread woken up.
    pub fn raise_flag(&mut self, flag: FlagId) -> Result<Option<ThreadId>, ObjectError> {
        let wait = self.flag_cb(flag)?.wait;
        let woken = self.wake_up_head(wait)?;
        if woken.is_none() {
            self.flags[flag.slot()].raised = true;
        }
        Ok(woken)
    }

    /// Wake up every waiter of `flag` without latching the event. Returns
    /// the number of threads woken up.
    pub fn pulse_flag(&mut self, flag: FlagId) -> Result<usize, ObjectError> {
        let wait = self.flag_cb(flag)?.wait;
        self.flush_wait(wait, ThreadInfo::BCAST)
    }
}
