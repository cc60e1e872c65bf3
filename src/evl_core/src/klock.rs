//! The core lock, and blocking of host threads
//!
//! [`Kernel`] serializes every service under a single spinlock (the
//! *nklock*) and backs each core thread that blocks with the host thread
//! that issued the call: the host thread parks until the core thread is
//! resumed, and the timers it depends on are fired from the parked thread
//! when their dates pass.
use core::{ops, task::Poll};
use spin::Mutex as SpinMutex;
use std::sync::Arc;

use crate::{
    cfg::KernelCfg,
    clock::{Clock, Ktime, TimeoutMode},
    error::{InitMutexError, LockMutexError, TryLockMutexError, UnlockMutexError, WaitError},
    flag::FlagId,
    mutex::{EvlMutex, MutexProtocol},
    sem::SemId,
    thread::{ThreadId, ThreadState},
    wait::WaitQueueId,
    State,
};

/// A core instance shared by host threads.
pub struct Kernel {
    state: SpinMutex<State>,
    clock: Arc<dyn Clock>,
}

/// RAII guard of the nklock. Host threads resumed while the lock was held
/// are unparked when it is released.
pub struct NkLockGuard<'a> {
    guard: Option<spin::MutexGuard<'a, State>>,
}

impl ops::Deref for NkLockGuard<'_> {
    type Target = State;

    #[inline]
    fn deref(&self) -> &State {
        self.guard.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl ops::DerefMut for NkLockGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut State {
        self.guard.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for NkLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            let woken = guard.take_woken();
            drop(guard);
            for host in woken {
                host.unpark();
            }
        }
    }
}

impl Kernel {
    pub fn new(cfg: KernelCfg) -> Self {
        let clock = Arc::clone(&cfg.clock);
        Self {
            state: SpinMutex::new(State::new(cfg)),
            clock,
        }
    }

    /// Acquire the nklock.
    pub fn lock(&self) -> NkLockGuard<'_> {
        NkLockGuard {
            guard: Some(self.state.lock()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run a blocking service for `curr`. `start` issues the call; if it
    /// returns `Poll::Pending`, the host thread parks until `curr` is
    /// resumed, and `finish` collects the outcome.
    fn block_on<R>(
        &self,
        curr: ThreadId,
        start: impl FnOnce(&mut State) -> Poll<R>,
        finish: impl FnOnce(&mut State) -> R,
    ) -> R {
        {
            let mut st = self.lock();
            match start(&mut *st) {
                Poll::Ready(result) => return result,
                Poll::Pending => st.attach_host(curr, Some(std::thread::current())),
            }
        }

        log::trace!("{curr:?}: parking");
        self.park_while_blocked(curr);
        log::trace!("{curr:?}: unparked");

        let mut st = self.lock();
        st.attach_host(curr, None);
        finish(&mut *st)
    }

    fn park_while_blocked(&self, curr: ThreadId) {
        loop {
            let deadline = {
                let st = self.lock();
                let blocked = st.thread(curr).map_or(false, |cb| {
                    cb.state()
                        .intersects(ThreadState::PEND | ThreadState::DELAY | ThreadState::SUSP)
                });
                if !blocked {
                    return;
                }
                st.thread_timeout(curr)
            };

            match deadline {
                None => std::thread::park(),
                Some(at) => {
                    let now = self.clock.read();
                    if now >= at {
                        self.lock().expire_timers();
                    } else {
                        std::thread::park_timeout((at - now).into());
                    }
                }
            }
        }
    }

    /// Put `curr` to sleep for `timeout`.
    pub fn delay(&self, curr: ThreadId, timeout: Ktime, mode: TimeoutMode) -> Result<(), WaitError> {
        self.block_on(
            curr,
            |st| st.delay_thread(curr, timeout, mode),
            |st| st.complete_delay(curr),
        )
    }

    /// Create a mutex and get a handle to it.
    pub fn init_mutex(
        &self,
        name: &str,
        protocol: MutexProtocol,
    ) -> Result<EvlMutex, InitMutexError> {
        let mut st = self.lock();
        let id = st.init_mutex(name, protocol)?;
        Ok(EvlMutex::new(id, st.mx(id)))
    }

    /// Try to acquire `mutex` without blocking. An uncontended
    /// priority-inheritance mutex is taken without entering the core.
    pub fn trylock_mutex(&self, curr: ThreadId, mutex: &EvlMutex) -> Result<(), TryLockMutexError> {
        if mutex.protocol() == MutexProtocol::Inherit
            && mutex.fastlock().try_acquire(curr.fundle())
        {
            return Ok(());
        }
        self.lock().trylock_mutex(curr, mutex.id())
    }

    /// Acquire `mutex`, blocking without a timeout.
    pub fn lock_mutex(&self, curr: ThreadId, mutex: &EvlMutex) -> Result<(), LockMutexError> {
        self.lock_mutex_timeout(curr, mutex, Ktime::INFINITE, TimeoutMode::Rel)
    }

    /// Acquire `mutex`. An uncontended priority-inheritance mutex is taken
    /// without entering the core.
    pub fn lock_mutex_timeout(
        &self,
        curr: ThreadId,
        mutex: &EvlMutex,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Result<(), LockMutexError> {
        if mutex.protocol() == MutexProtocol::Inherit
            && mutex.fastlock().try_acquire(curr.fundle())
        {
            return Ok(());
        }
        let id = mutex.id();
        self.block_on(
            curr,
            |st| st.lock_mutex_timeout(curr, id, timeout, mode),
            |st| st.complete_lock_mutex(curr, id),
        )
    }

    /// Release `mutex`. A mutex without waiters or ceiling is released
    /// without entering the core.
    pub fn unlock_mutex(&self, curr: ThreadId, mutex: &EvlMutex) -> Result<(), UnlockMutexError> {
        if mutex.fastlock().try_release(curr.fundle()) {
            return Ok(());
        }
        self.lock().unlock_mutex(curr, mutex.id())
    }

    /// Sleep on `wq` until `cond` holds. `cond` is evaluated under the
    /// nklock, before the first sleep and after each wake-up.
    pub fn wait_event_timeout(
        &self,
        curr: ThreadId,
        wq: WaitQueueId,
        timeout: Ktime,
        mode: TimeoutMode,
        mut cond: impl FnMut(&mut State) -> bool,
    ) -> Result<(), WaitError> {
        // Restarted sleeps share the original deadline
        let (timeout, mode) = match mode {
            TimeoutMode::Rel if !timeout.is_infinite() => {
                (self.clock.read() + timeout, TimeoutMode::Abs)
            }
            _ => (timeout, mode),
        };

        loop {
            let satisfied = self.block_on(
                curr,
                |st| {
                    if cond(st) {
                        return Poll::Ready(Ok(true));
                    }
                    if let Err(e) = st.add_wait_queue(curr, wq, timeout, mode) {
                        return Poll::Ready(Err(e));
                    }
                    if st.th(curr).is_blocked() {
                        Poll::Pending
                    } else {
                        Poll::Ready(st.wait_result(curr).map(|()| false))
                    }
                },
                |st| st.wait_result(curr).map(|()| false),
            )?;
            if satisfied {
                return Ok(());
            }
        }
    }

    /// Wait for `flag` to be raised.
    pub fn wait_flag_timeout(
        &self,
        curr: ThreadId,
        flag: FlagId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Result<(), WaitError> {
        self.block_on(
            curr,
            |st| st.wait_flag_timeout(curr, flag, timeout, mode),
            |st| st.wait_result(curr),
        )
    }

    /// Take a unit of `sem`.
    pub fn down_timeout(
        &self,
        curr: ThreadId,
        sem: SemId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Result<(), WaitError> {
        self.block_on(
            curr,
            |st| st.down_timeout(curr, sem, timeout, mode),
            |st| st.wait_result(curr),
        )
    }
}
