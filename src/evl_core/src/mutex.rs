//! Mutexes
//!
//! A mutex is owned through its *lock word*, an atomic 32-bit value holding
//! the [`Fundle`] of the owner plus two status bits:
//!
//!  - [`FLCLAIM`] is set while the mutex is contended. An owner cannot
//!    release a claimed mutex without entering the core, which hands it over
//!    to the first waiter.
//!
//!  - [`FLCEIL`] is set while a priority ceiling is applied to the owner.
//!
//! An uncontended [`MutexProtocol::Inherit`] mutex is acquired and released
//! by a single compare-and-swap on the lock word (see [`crate::Kernel`]); its
//! ownership is only recorded in the core once another thread contends for
//! it. [`MutexProtocol::Protect`] mutexes always go through the core since
//! acquiring one changes the priority of the owner.
//!
//! The owner of a mutex with waiters is *boosted*: it runs at the priority of
//! the highest-priority waiter (priority inheritance), or at the ceiling
//! priority (priority protection), whichever is higher. Boosts propagate
//! along ownership chains.
use bitflags::bitflags;
use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
    task::Poll,
};
use std::sync::Arc;

use crate::{
    clock::{Ktime, TimeoutMode},
    error::{
        BadIdError, BadParamError, ChainError, InitMutexError, LockMutexError,
        LockMutexPrecheckError, ObjectError, SetMutexCeilingError, TryLockMutexError,
        UnlockMutexError,
    },
    sched::{Prio, CORE_MAX_PRIO, CORE_MIN_PRIO},
    thread::{Fundle, ThreadCb, ThreadId, ThreadInfo, ThreadState, FUNDLE_MASK, NO_HANDLE},
    utils::define_id,
    wait::{WaitChannel, WaitChannelRef, WaitPolicy, WalkMode},
    State,
};

define_id! {
    /// Identifies a mutex.
    pub struct MutexId;
}

/// Lock word bit: the mutex is contended.
pub const FLCLAIM: u32 = 0x8000_0000;

/// Lock word bit: a priority ceiling is applied to the owner.
pub const FLCEIL: u32 = 0x4000_0000;

/// The atomic lock word of a mutex.
pub struct FastLock(AtomicU32);

impl FastLock {
    /// The value of the lock word of a destroyed mutex. Neither fast path
    /// succeeds on it.
    const DESTROYED: u32 = u32::MAX;

    fn new() -> Self {
        Self(AtomicU32::new(NO_HANDLE))
    }

    #[inline]
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// The handle of the owner.
    #[inline]
    pub fn owner(&self) -> Fundle {
        self.load() & FUNDLE_MASK
    }

    /// Take a free lock.
    #[inline]
    pub(crate) fn try_acquire(&self, fundle: Fundle) -> bool {
        self.0
            .compare_exchange(NO_HANDLE, fundle, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Release a lock that is neither claimed nor ceiling-boosted.
    #[inline]
    pub(crate) fn try_release(&self, fundle: Fundle) -> bool {
        self.0
            .compare_exchange(fundle, NO_HANDLE, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn store(&self, word: u32) {
        self.0.store(word, Ordering::Release);
    }

    /// Set [`FLCLAIM`] if `word` is still current.
    #[inline]
    fn claim(&self, word: u32) -> bool {
        word & FLCLAIM != 0
            || self
                .0
                .compare_exchange(word, word | FLCLAIM, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
    }

    #[inline]
    fn clear_bits(&self, bits: u32) {
        self.0.fetch_and(!bits, Ordering::AcqRel);
    }
}

impl fmt::Debug for FastLock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FastLock({:#010x})", self.load())
    }
}

/// Specifies the priority protocol of a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexProtocol {
    /// Priority inheritance
    Inherit,
    /// Priority protection (ceiling). The ceiling is expressed on the core
    /// scale.
    Protect { ceiling: i32 },
}

bitflags! {
    /// Status bits of a mutex.
    pub struct MutexFlags: u32 {
        /// Priority inheritance protocol.
        const PI = 1 << 0;
        /// Priority protection protocol.
        const PP = 1 << 1;
        /// The mutex has waiters, and the owner is tracked.
        const CLAIMED = 1 << 2;
        /// The ceiling priority is applied to the owner.
        const CEILING = 1 << 3;
        /// The inherited priority raises the owner above its base.
        const PIBOOST = 1 << 4;
    }
}

/// A boost a mutex applies to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boost {
    /// Inherited from the top waiter.
    Inherit(Prio),
    /// Ceiling on the core scale, applied in the owner's base class.
    Ceiling(i32),
}

/// *Mutex control block*
pub struct MutexCb {
    gen: u32,
    name: String,
    pub(crate) flags: MutexFlags,
    pub(crate) fastlock: Arc<FastLock>,
    /// The configured ceiling (priority protection only).
    ceiling: i32,
    /// The ceiling in effect for the current owner.
    applied_ceiling: i32,
    pub(crate) chan: WaitChannel,
    /// The owner, once tracked.
    pub(crate) owner: Option<ThreadId>,
    /// The priority of the top waiter (priority inheritance only).
    pi_boost: Option<Prio>,
}

impl fmt::Debug for MutexCb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MutexCb")
            .field("self", &(self as *const _))
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("fastlock", &self.fastlock)
            .field("ceiling", &self.ceiling)
            .field("chan", &self.chan)
            .field("owner", &self.owner)
            .field("pi_boost", &self.pi_boost)
            .finish()
    }
}

impl MutexCb {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> MutexFlags {
        self.flags
    }

    pub fn lock_word(&self) -> u32 {
        self.fastlock.load()
    }

    pub fn channel(&self) -> &WaitChannel {
        &self.chan
    }

    /// The priority ceiling, if the mutex is priority-protected.
    pub fn ceiling(&self) -> Option<i32> {
        self.flags.contains(MutexFlags::PP).then(|| self.ceiling)
    }

    /// The boost this mutex currently applies to its owner.
    pub(crate) fn boost(&self) -> Option<Boost> {
        if self.flags.contains(MutexFlags::CEILING) {
            Some(Boost::Ceiling(self.applied_ceiling))
        } else {
            self.pi_boost.map(Boost::Inherit)
        }
    }
}

/// A handle to a mutex, carrying what the lock-free fast paths need.
#[derive(Debug, Clone)]
pub struct EvlMutex {
    id: MutexId,
    fastlock: Arc<FastLock>,
    protocol: MutexProtocol,
}

impl EvlMutex {
    pub(crate) fn new(id: MutexId, cb: &MutexCb) -> Self {
        let protocol = match cb.ceiling() {
            Some(ceiling) => MutexProtocol::Protect { ceiling },
            None => MutexProtocol::Inherit,
        };
        Self {
            id,
            fastlock: Arc::clone(&cb.fastlock),
            protocol,
        }
    }

    pub fn id(&self) -> MutexId {
        self.id
    }

    pub fn protocol(&self) -> MutexProtocol {
        self.protocol
    }

    pub fn lock_word(&self) -> u32 {
        self.fastlock.load()
    }

    pub(crate) fn fastlock(&self) -> &FastLock {
        &self.fastlock
    }
}

/// Mutex object management
impl State {
    pub(crate) fn mutex_cb(&self, mutex: MutexId) -> Result<&MutexCb, BadIdError> {
        self.mutexes
            .get(mutex.slot())
            .filter(|cb| cb.gen == mutex.gen())
            .ok_or(BadIdError::BadId)
    }

    #[inline]
    pub(crate) fn mx(&self, mutex: MutexId) -> &MutexCb {
        &self.mutexes[mutex.slot()]
    }

    #[inline]
    pub(crate) fn mx_mut(&mut self, mutex: MutexId) -> &mut MutexCb {
        &mut self.mutexes[mutex.slot()]
    }

    /// Get the control block of `mutex`. Returns `None` if the identifier is
    /// stale.
    pub fn mutex(&self, mutex: MutexId) -> Option<&MutexCb> {
        self.mutex_cb(mutex).ok()
    }

    /// Get a handle to `mutex` usable on the fast paths of
    /// [`crate::Kernel`].
    pub fn mutex_handle(&self, mutex: MutexId) -> Option<EvlMutex> {
        let cb = self.mutex_cb(mutex).ok()?;
        Some(EvlMutex::new(mutex, cb))
    }

    /// Create a mutex.
    pub fn init_mutex(
        &mut self,
        name: &str,
        protocol: MutexProtocol,
    ) -> Result<MutexId, InitMutexError> {
        let (flags, ceiling) = match protocol {
            MutexProtocol::Inherit => (MutexFlags::PI, 0),
            MutexProtocol::Protect { ceiling } => {
                if !(CORE_MIN_PRIO..=CORE_MAX_PRIO).contains(&ceiling) {
                    return Err(BadParamError::BadParam.into());
                }
                (MutexFlags::PP, ceiling)
            }
        };
        let gen = self.next_gen();
        let entry = self.mutexes.vacant_entry();
        let mutex = MutexId::new(entry.key(), gen);
        entry.insert(MutexCb {
            gen,
            name: name.to_owned(),
            flags,
            fastlock: Arc::new(FastLock::new()),
            ceiling,
            applied_ceiling: ceiling,
            chan: WaitChannel::new(WaitPolicy::Prio),
            owner: None,
            pi_boost: None,
        });
        log::debug!("created {mutex:?} ({name}, {protocol:?})");
        Ok(mutex)
    }

    /// Change the ceiling of a priority-protected mutex. The new ceiling
    /// applies from the next acquisition on.
    pub fn set_mutex_ceiling(
        &mut self,
        mutex: MutexId,
        ceiling: i32,
    ) -> Result<(), SetMutexCeilingError> {
        let cb = self.mutex_cb(mutex)?;
        if !cb.flags.contains(MutexFlags::PP)
            || !(CORE_MIN_PRIO..=CORE_MAX_PRIO).contains(&ceiling)
        {
            return Err(BadParamError::BadParam.into());
        }
        self.mx_mut(mutex).ceiling = ceiling;
        Ok(())
    }

    /// The current owner of `mutex`, as recorded in its lock word.
    pub fn mutex_owner(&self, mutex: MutexId) -> Result<Option<ThreadId>, ObjectError> {
        let cb = self.mutex_cb(mutex)?;
        Ok(match cb.fastlock.owner() {
            NO_HANDLE => None,
            fundle => self.thread_by_fundle(fundle),
        })
    }

    /// Wake up every waiter of `mutex`, marking each with `reason`. The
    /// mutex stays owned, so the waiters' lock attempts fail: with `Removed`
    /// for `RMID`, with `Broken` for any other reason. Returns the number of
    /// threads woken up.
    pub fn flush_mutex(&mut self, mutex: MutexId, reason: ThreadInfo) -> Result<usize, ObjectError> {
        let owner = self.mutex_cb(mutex)?.owner;
        let reason = if reason.contains(ThreadInfo::RMID) {
            reason
        } else {
            reason | ThreadInfo::BREAK
        };
        let mut count = 0;
        while let Some(thread) = self.pop_waiter(WaitChannelRef::Mutex(mutex)) {
            self.th_mut(thread).info.insert(reason);
            self.resume_thread(thread, ThreadState::PEND | ThreadState::DELAY);
            count += 1;
        }
        self.drop_claim(mutex);
        if let Some(owner) = owner {
            self.reboost(owner, WalkMode::Reset);
        }
        log::debug!("flushed {mutex:?}, {count} waiter(s) woken up");
        Ok(count)
    }

    /// Wake up every waiter of `mutex` with `RMID`, then delete it. Returns
    /// the number of threads woken up.
    pub fn destroy_mutex(&mut self, mutex: MutexId) -> Result<usize, ObjectError> {
        let count = self.flush_mutex(mutex, ThreadInfo::RMID)?;
        if let Some(owner) = self.mx(mutex).owner {
            self.untrack_owner(mutex);
            self.reboost(owner, WalkMode::Reset);
        }
        self.mx(mutex).fastlock.store(FastLock::DESTROYED);
        self.mutexes.remove(mutex.slot());
        log::debug!("destroyed {mutex:?}");
        Ok(count)
    }

    /// The mutexes whose lock word names `fundle` as the owner.
    pub(crate) fn mutexes_owned_by(&self, fundle: Fundle) -> Vec<MutexId> {
        self.mutexes
            .iter()
            .filter(|(_, cb)| cb.fastlock.owner() == fundle)
            .map(|(slot, cb)| MutexId::new(slot, cb.gen))
            .collect()
    }
}

/// Ownership tracking and boosts
impl State {
    fn add_booster(&mut self, thread: ThreadId, mutex: MutexId) {
        let boosters = &mut self.th_mut(thread).boosters;
        if !boosters.contains(&mutex) {
            boosters.push(mutex);
        }
    }

    fn remove_booster(&mut self, thread: ThreadId, mutex: MutexId) {
        self.th_mut(thread).boosters.retain(|&m| m != mutex);
    }

    /// Record `owner` as the owner of `mutex`.
    fn track_owner(&mut self, mutex: MutexId, owner: ThreadId) {
        match self.mx(mutex).owner {
            Some(tracked) if tracked == owner => return,
            Some(_) => self.untrack_owner(mutex),
            None => {}
        }
        self.mx_mut(mutex).owner = Some(owner);
        self.th_mut(owner).owned_mutexes.push(mutex);
    }

    fn untrack_owner(&mut self, mutex: MutexId) {
        if let Some(owner) = self.mx_mut(mutex).owner.take() {
            let cb = self.th_mut(owner);
            cb.owned_mutexes.retain(|&m| m != mutex);
            cb.boosters.retain(|&m| m != mutex);
        }
    }

    /// Recompute the inherited priority of `mutex` from its top waiter.
    fn refresh_pi_boost(&mut self, mutex: MutexId) {
        let cb = self.mx(mutex);
        if !cb.flags.contains(MutexFlags::PI) {
            return;
        }
        let boost = cb.chan.head().map(|t| {
            let waiter = self.th(t);
            Prio {
                class: waiter.sched_class,
                prio: waiter.cprio,
            }
        });
        let owner = cb.owner;
        self.mx_mut(mutex).pi_boost = boost;
        if let Some(owner) = owner {
            if boost.is_some() {
                self.add_booster(owner, mutex);
            } else {
                self.remove_booster(owner, mutex);
            }
        }
    }

    /// Drop the contention state of `mutex` after its last waiter left. The
    /// owner stays tracked only if a ceiling is applied to it.
    fn drop_claim(&mut self, mutex: MutexId) {
        let cb = self.mx_mut(mutex);
        debug_assert!(cb.chan.is_empty());
        cb.flags.remove(MutexFlags::CLAIMED | MutexFlags::PIBOOST);
        cb.pi_boost = None;
        cb.fastlock.clear_bits(FLCLAIM);
        if !cb.flags.contains(MutexFlags::CEILING) {
            self.untrack_owner(mutex);
        }
    }

    fn boost_wprio(thread: &ThreadCb, boost: Boost) -> i32 {
        match boost {
            Boost::Inherit(prio) => prio.wprio(),
            Boost::Ceiling(ceiling) => thread
                .base_class
                .wprio(thread.base_class.ops().clamp_ceiling(ceiling)),
        }
    }

    /// Recompute the boost of `thread` from the mutexes it owns, and move it
    /// to the resulting priority. Returns `true` if its current priority
    /// changed.
    pub(crate) fn adjust_boost(&mut self, thread: ThreadId) -> bool {
        let cb = self.th(thread);
        let base = cb.base_wprio();
        let mut best: Option<(i32, Boost)> = None;
        let mut pi_boosting = Vec::new();
        for &mutex in cb.boosters.iter() {
            let Some(boost) = self.mx(mutex).boost() else {
                continue;
            };
            let wprio = Self::boost_wprio(cb, boost);
            if matches!(boost, Boost::Inherit(_)) {
                pi_boosting.push((mutex, wprio > base));
            }
            if best.map_or(true, |(w, _)| wprio > w) {
                best = Some((wprio, boost));
            }
        }

        for (mutex, boosting) in pi_boosting {
            self.mx_mut(mutex)
                .flags
                .set(MutexFlags::PIBOOST, boosting);
        }

        let target = match best {
            Some((wprio, boost)) if wprio > base => Some(boost),
            _ => None,
        };
        self.th_mut(thread)
            .state
            .set(ThreadState::BOOST, target.is_some());
        self.track_priority(thread, target)
    }

    /// Recompute the boost of `owner` and, if it changed, propagate it along
    /// the chain `owner` is waiting on.
    fn reboost(&mut self, owner: ThreadId, mode: WalkMode) {
        if self.adjust_boost(owner) && self.th(owner).wchan.is_some() {
            if let Err(e) = self.adjust_wait_priority(owner, mode) {
                log::warn!("{owner:?}: priority walk failed: {e:?}");
            }
        }
    }

    /// Get a flag indicating whether the ownership chain starting at `from`
    /// leads to `to`.
    fn depends_on(&self, from: ThreadId, to: ThreadId) -> bool {
        let mut thread = from;
        for _ in 0..=self.threads.len() {
            if thread == to {
                return true;
            }
            let Some(WaitChannelRef::Mutex(mutex)) = self.th(thread).wchan else {
                return false;
            };
            match self.thread_by_fundle(self.mx(mutex).fastlock.owner()) {
                Some(owner) => thread = owner,
                None => return false,
            }
        }
        true
    }

    /// Remove `thread` from the waiters of `mutex` after its wait was
    /// interrupted, and update the boost of the owner.
    pub(crate) fn abort_mutex_wait(&mut self, mutex: MutexId, thread: ThreadId) {
        self.unlink_waiter(WaitChannelRef::Mutex(mutex), thread);
        let owner = self.mx(mutex).owner;
        if self.mx(mutex).chan.is_empty() {
            self.drop_claim(mutex);
        } else {
            self.refresh_pi_boost(mutex);
        }
        if let Some(owner) = owner {
            self.reboost(owner, WalkMode::Adjust);
        }
    }

    /// Propagate a priority change of a waiter of `mutex` to its owner.
    pub(crate) fn follow_mutex_depend(
        &mut self,
        mutex: MutexId,
        originator: ThreadId,
        mode: WalkMode,
    ) -> Result<Option<ThreadId>, ChainError> {
        let cb = self.mx(mutex);
        let Some(owner) = cb.owner else {
            return if cb.chan.is_empty() {
                Ok(None)
            } else {
                Err(ChainError::BadObjectState)
            };
        };
        if owner == originator {
            return Err(ChainError::WouldDeadlock);
        }

        match mode {
            WalkMode::Check => {
                if cb.flags.contains(MutexFlags::PI) {
                    if let Some(head) = cb.chan.head() {
                        if self.th(owner).wprio() < self.th(head).wprio() {
                            return Err(ChainError::BadObjectState);
                        }
                    }
                }
                Ok(Some(owner))
            }
            WalkMode::Adjust | WalkMode::Reset => {
                self.refresh_pi_boost(mutex);
                let changed = self.adjust_boost(owner);
                Ok((changed || mode == WalkMode::Reset).then(|| owner))
            }
        }
    }
}

/// Locking
impl State {
    fn lock_precheck(&self, curr: ThreadId, mutex: MutexId) -> Result<(), LockMutexPrecheckError> {
        let cb = self.expect_caller(curr)?;
        let mx = self.mutex_cb(mutex)?;
        if mx.fastlock.owner() == curr.fundle() {
            return Err(LockMutexPrecheckError::WouldDeadlock);
        }
        if let Some(ceiling) = mx.ceiling() {
            if cb.bprio > cb.base_class.ops().clamp_ceiling(ceiling) {
                return Err(LockMutexPrecheckError::BadParam);
            }
        }
        Ok(())
    }

    /// Finish an uncontended acquisition of `mutex` by `curr`.
    fn on_acquired(&mut self, curr: ThreadId, mutex: MutexId) {
        let cb = self.mx_mut(mutex);
        if cb.flags.contains(MutexFlags::PP) {
            cb.flags.insert(MutexFlags::CEILING);
            cb.applied_ceiling = cb.ceiling;
            cb.fastlock.store(curr.fundle() | FLCEIL);
            self.track_owner(mutex, curr);
            self.add_booster(curr, mutex);
            self.adjust_boost(curr);
        }
        log::trace!("{curr:?} acquired {mutex:?}");
    }

    /// Try to acquire `mutex` without blocking.
    pub fn trylock_mutex(&mut self, curr: ThreadId, mutex: MutexId) -> Result<(), TryLockMutexError> {
        self.lock_precheck(curr, mutex)?;
        if self.mx(mutex).fastlock.try_acquire(curr.fundle()) {
            self.on_acquired(curr, mutex);
            Ok(())
        } else {
            Err(TryLockMutexError::Busy)
        }
    }

    /// Acquire `mutex`, blocking without a timeout.
    pub fn lock_mutex(&mut self, curr: ThreadId, mutex: MutexId) -> Poll<Result<(), LockMutexError>> {
        self.lock_mutex_timeout(curr, mutex, Ktime::INFINITE, TimeoutMode::Rel)
    }

    /// Acquire `mutex`.
    ///
    /// If the mutex is owned, the caller is queued by priority and goes to
    /// sleep, boosting the owner if the mutex uses priority inheritance.
    /// `Poll::Pending` is returned in that case, and the outcome is collected
    /// by [`State::complete_lock_mutex`] once the caller is resumed: either
    /// the mutex was handed over to it, or the wait failed.
    pub fn lock_mutex_timeout(
        &mut self,
        curr: ThreadId,
        mutex: MutexId,
        timeout: Ktime,
        mode: TimeoutMode,
    ) -> Poll<Result<(), LockMutexError>> {
        if let Err(e) = self.lock_precheck(curr, mutex) {
            return Poll::Ready(Err(e.into()));
        }

        let fundle = curr.fundle();
        let owner_fundle = loop {
            let fastlock = &self.mx(mutex).fastlock;
            if fastlock.try_acquire(fundle) {
                self.on_acquired(curr, mutex);
                return Poll::Ready(Ok(()));
            }
            // The owner may release it through the fast path until the claim
            // bit is set
            let word = fastlock.load();
            if word & FUNDLE_MASK != NO_HANDLE && fastlock.claim(word) {
                break word & FUNDLE_MASK;
            }
        };

        let Some(owner) = self.thread_by_fundle(owner_fundle) else {
            log::warn!("{mutex:?} is owned by a stale handle {owner_fundle:#x}");
            if self.mx(mutex).chan.is_empty() {
                self.drop_claim(mutex);
            }
            return Poll::Ready(Err(LockMutexError::BadObjectState));
        };
        self.track_owner(mutex, owner);

        if self.depends_on(owner, curr) {
            if self.mx(mutex).chan.is_empty() {
                self.drop_claim(mutex);
            }
            return Poll::Ready(Err(LockMutexError::WouldDeadlock));
        }

        self.mx_mut(mutex).flags.insert(MutexFlags::CLAIMED);
        self.link_waiter(WaitChannelRef::Mutex(mutex), curr);
        self.refresh_pi_boost(mutex);
        self.reboost(owner, WalkMode::Adjust);
        log::trace!("{curr:?} waits for {mutex:?} owned by {owner:?}");

        self.sleep_on(curr, timeout, mode);
        debug_assert!(self.adjust_wait_priority(curr, WalkMode::Check).is_ok());

        if self.th(curr).is_blocked() {
            Poll::Pending
        } else {
            Poll::Ready(self.complete_lock_mutex(curr, mutex))
        }
    }

    /// Collect the outcome of a [`State::lock_mutex_timeout`] call that
    /// returned `Poll::Pending`.
    ///
    /// A waiter released without being handed the mutex (e.g., by
    /// [`State::flush_mutex`]) fails with `Broken`.
    pub fn complete_lock_mutex(&self, curr: ThreadId, mutex: MutexId) -> Result<(), LockMutexError> {
        self.wait_result(curr)?;
        match self.mutex_cb(mutex) {
            Ok(cb) if cb.fastlock.owner() == curr.fundle() => Ok(()),
            Ok(_) => Err(LockMutexError::Broken),
            Err(_) => Err(LockMutexError::Removed),
        }
    }

    /// Release `mutex`. If it has waiters, ownership passes directly to the
    /// first one.
    pub fn unlock_mutex(&mut self, curr: ThreadId, mutex: MutexId) -> Result<(), UnlockMutexError> {
        self.expect_caller(curr)?;
        let cb = self.mutex_cb(mutex)?;
        let fundle = curr.fundle();
        if cb.fastlock.owner() != fundle {
            return Err(UnlockMutexError::NotOwner);
        }
        if cb.fastlock.try_release(fundle) {
            log::trace!("{curr:?} released {mutex:?}");
            return Ok(());
        }
        self.release_mutex(curr, mutex);
        Ok(())
    }

    /// Release `mutex` owned by `owner` through the core, handing it over to
    /// the first waiter if there is one.
    pub(crate) fn release_mutex(&mut self, owner: ThreadId, mutex: MutexId) {
        let cb = self.mx_mut(mutex);
        cb.flags.remove(MutexFlags::CEILING | MutexFlags::PIBOOST);
        cb.pi_boost = None;
        self.untrack_owner(mutex);

        match self.pop_waiter(WaitChannelRef::Mutex(mutex)) {
            None => {
                let cb = self.mx_mut(mutex);
                cb.flags.remove(MutexFlags::CLAIMED);
                cb.fastlock.store(NO_HANDLE);
                log::trace!("{owner:?} released {mutex:?}");
            }
            Some(next) => {
                let cb = self.mx_mut(mutex);
                let mut word = next.fundle();
                if cb.chan.is_empty() {
                    cb.flags.remove(MutexFlags::CLAIMED);
                } else {
                    word |= FLCLAIM;
                }
                if cb.flags.contains(MutexFlags::PP) {
                    cb.flags.insert(MutexFlags::CEILING);
                    cb.applied_ceiling = cb.ceiling;
                    word |= FLCEIL;
                }
                cb.fastlock.store(word);

                if word & (FLCLAIM | FLCEIL) != 0 {
                    self.track_owner(mutex, next);
                    if word & FLCEIL != 0 {
                        self.add_booster(next, mutex);
                    }
                    self.refresh_pi_boost(mutex);
                }

                self.th_mut(next).info.insert(ThreadInfo::WAKEN);
                self.resume_thread(next, ThreadState::PEND | ThreadState::DELAY);
                self.adjust_boost(next);
                log::debug!("{mutex:?} handed over from {owner:?} to {next:?}");
            }
        }

        self.adjust_boost(owner);
    }
}
