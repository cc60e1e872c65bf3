//! Error types
//!
//! Every failure of a core service is an expected, recoverable outcome
//! reported through a plain `Result`. The error enums share their
//! discriminants with [`ResultCode`], whose values are the negated Linux
//! `errno` codes the co-kernel reports to its callers.
use core::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use evl_core::ResultCode;
            /// assert_eq!(ResultCode::Removed.as_str(), "Removed");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) the core can report.
    ///
    /// The values are negated Linux `errno` codes so that a syscall layer can
    /// forward them unchanged.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful.
        Success = 0,
        /// The caller does not own the resource (`EPERM`).
        NotOwner = -1,
        /// The object identifier is stale or was never valid (`ENOENT`).
        BadId = -2,
        /// The wait was forcibly broken before the resource was granted
        /// (`EINTR`).
        Broken = -4,
        /// The resource is temporarily unavailable (`EAGAIN`).
        Again = -11,
        /// No room left for another object (`ENOMEM`).
        NoMemory = -12,
        /// The resource is owned by someone else (`EBUSY`).
        Busy = -16,
        /// A parameter is out of range (`EINVAL`).
        BadParam = -22,
        /// Resource deadlock would occur (`EDEADLK`).
        WouldDeadlock = -35,
        /// The object was destroyed while the caller was waiting on it
        /// (`EIDRM`).
        Removed = -43,
        /// A target object is in a state that disallows the operation
        /// (`EBADFD`).
        BadObjectState = -77,
        /// The operation timed out (`ETIMEDOUT`).
        Timeout = -110,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }

    /// Get the status value a syscall layer would return.
    #[inline]
    pub fn to_status(self) -> i32 {
        self as i8 as i32
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode` for cost-free
                // conversion
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(ResultCode::from(*self).as_str())
            }
        }

        impl std::error::Error for $name {}

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                match x {
                    $( $name::$vname => Self::$vname, )*
                }
            }
        }

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                    assert_eq!(
                        ResultCode::$vname as i8,
                        $name::$vname as i8,
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }
    };
}

define_error! {
    mod cfg_error {}
    /// Error type for [`CfgBuilder::finish`].
    ///
    /// [`CfgBuilder::finish`]: crate::cfg::CfgBuilder::finish
    pub enum CfgError {
        /// The CPU count or the thread limit is out of range.
        BadParam,
    }
}

define_error! {
    mod create_thread_error {}
    /// Error type for [`State::create_thread`].
    ///
    /// [`State::create_thread`]: crate::State::create_thread
    pub enum CreateThreadError {
        /// The scheduling parameters or the CPU number are invalid.
        BadParam,
        /// The thread table is full.
        NoMemory,
    }
}

define_error! {
    mod thread_error {}
    /// Error type for the thread lifecycle services ([`State::start_thread`],
    /// [`State::hold_thread`], [`State::exit_thread`], ...).
    ///
    /// [`State::start_thread`]: crate::State::start_thread
    /// [`State::hold_thread`]: crate::State::hold_thread
    /// [`State::exit_thread`]: crate::State::exit_thread
    pub enum ThreadError {
        /// The thread identifier is stale.
        BadId,
        /// The thread is in a state that disallows the operation.
        BadObjectState,
    }
}

define_error! {
    mod set_sched_param_error {}
    /// Error type for [`State::set_schedparam`].
    ///
    /// [`State::set_schedparam`]: crate::State::set_schedparam
    pub enum SetSchedParamError {
        /// The thread identifier is stale.
        BadId,
        /// The parameters are out of the class range, or the new base
        /// priority would exceed the ceiling of a priority-protected mutex
        /// the thread holds.
        BadParam,
        /// The thread is a zombie.
        BadObjectState,
    }
}

define_error! {
    mod wait_error {}
    /// Error type for the wait-queue services and for the completion of any
    /// blocking wait ([`State::wait_result`]).
    ///
    /// [`State::wait_result`]: crate::State::wait_result
    pub enum WaitError {
        /// The thread or wait queue identifier is stale.
        BadId,
        /// The calling thread is not in a runnable state.
        BadObjectState,
        /// The timeout expired before the thread was woken up.
        Timeout,
        /// The wait channel was destroyed while the thread was waiting.
        Removed,
        /// The wait was forcibly broken.
        Broken,
    }
}

define_error! {
    mod try_wait_error {}
    /// Error type for non-blocking acquisition of a semaphore or a flag.
    pub enum TryWaitError {
        /// The thread or object identifier is stale.
        BadId,
        /// The calling thread is not in a runnable state.
        BadObjectState,
        /// Nothing to consume at the moment.
        Again,
    }
}

define_error! {
    mod object_error {}
    /// Error type for services acting on an object without a calling thread
    /// (flush, destroy, wake-up).
    pub enum ObjectError {
        /// The object identifier is stale.
        BadId,
    }
}

define_error! {
    mod try_lock_mutex_error {}
    /// Error type for [`State::trylock_mutex`].
    ///
    /// [`State::trylock_mutex`]: crate::State::trylock_mutex
    pub enum TryLockMutexError {
        /// The thread or mutex identifier is stale.
        BadId,
        /// The calling thread is not in a runnable state.
        BadObjectState,
        /// The mutex is owned by another thread.
        Busy,
        /// The calling thread already owns the mutex.
        WouldDeadlock,
        /// The mutex is priority-protected and its ceiling is lower than the
        /// caller's base priority.
        BadParam,
    }
}

define_error! {
    mod lock_mutex_error {}
    /// Error type for [`State::lock_mutex_timeout`].
    ///
    /// [`State::lock_mutex_timeout`]: crate::State::lock_mutex_timeout
    pub enum LockMutexError {
        /// The thread or mutex identifier is stale.
        BadId,
        /// The calling thread is not in a runnable state.
        BadObjectState,
        /// The calling thread already owns the mutex, or the ownership chain
        /// of the mutex leads back to the calling thread.
        WouldDeadlock,
        /// The mutex is priority-protected and its ceiling is lower than the
        /// caller's base priority.
        BadParam,
        /// The timeout expired before ownership was granted.
        Timeout,
        /// The mutex was flushed or destroyed while the caller was waiting.
        Removed,
        /// The wait was forcibly broken.
        Broken,
    }
}

define_error! {
    mod unlock_mutex_error {}
    /// Error type for [`State::unlock_mutex`].
    ///
    /// [`State::unlock_mutex`]: crate::State::unlock_mutex
    pub enum UnlockMutexError {
        /// The thread or mutex identifier is stale.
        BadId,
        /// The calling thread is not in a runnable state.
        BadObjectState,
        /// The calling thread does not own the mutex.
        NotOwner,
    }
}

define_error! {
    mod chain_error {}
    /// Error type for [`State::adjust_wait_priority`].
    ///
    /// [`State::adjust_wait_priority`]: crate::State::adjust_wait_priority
    pub enum ChainError {
        /// The ownership chain loops back to a thread it started from.
        WouldDeadlock,
        /// A waiter outranks the boost of the owner it waits for.
        BadObjectState,
    }
}

define_error! {
    mod init_mutex_error {}
    /// Error type for [`State::init_mutex`].
    ///
    /// [`State::init_mutex`]: crate::State::init_mutex
    pub enum InitMutexError {
        /// The priority ceiling is out of range.
        BadParam,
    }
}

define_error! {
    mod rotate_error {}
    /// Error type for [`State::rotate`].
    ///
    /// [`State::rotate`]: crate::State::rotate
    pub enum RotateError {
        /// The CPU or the priority level is out of range.
        BadParam,
    }
}

define_error! {
    mod set_mutex_ceiling_error {}
    /// Error type for [`State::set_mutex_ceiling`].
    ///
    /// [`State::set_mutex_ceiling`]: crate::State::set_mutex_ceiling
    pub enum SetMutexCeilingError {
        /// The mutex identifier is stale.
        BadId,
        /// The mutex is not priority-protected, or the ceiling is out of
        /// range.
        BadParam,
    }
}

macro_rules! define_suberror {
    (
        $( #[doc $( $doc:tt )*] )*
        $( #[into( $Supererror:path )] )*
        $vis:vis enum $Name:ident {
            $( $Variant:ident, )*
        }
    ) => {
        $( #[doc $( $doc )*] )*
        #[repr(i8)]
        #[derive(PartialEq, Eq, Copy, Clone)]
        $vis enum $Name {
            $( $Variant = ResultCode::$Variant as _ ),*
        }

        impl fmt::Debug for $Name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        define_suberror! {
            @into
            #[into(ResultCode)]
            $( #[into( $Supererror )] )*
            enum $Name {
                $( $Variant, )*
            }
        }
    };

    (
        @into
        #[into( $Supererror0:path )]
        $( #[into( $Supererror:path )] )*
        enum $Name:ident {
            $( $Variant:ident, )*
        }
    ) => {
        impl From<$Name> for $Supererror0 {
            #[inline]
            fn from(x: $Name) -> Self {
                match x {
                    $( $Name::$Variant => Self::$Variant ),*
                }
            }
        }

        define_suberror! {
            @into
            $( #[into( $Supererror )] )*
            enum $Name {
                $( $Variant, )*
            }
        }
    };

    ( @into enum $($_:tt)* ) => {};
}

define_suberror! {
    /// `BadId`
    #[into(ThreadError)]
    #[into(SetSchedParamError)]
    #[into(WaitError)]
    #[into(TryWaitError)]
    #[into(ObjectError)]
    #[into(TryLockMutexError)]
    #[into(LockMutexError)]
    #[into(UnlockMutexError)]
    #[into(LockMutexPrecheckError)]
    #[into(SetMutexCeilingError)]
    pub(crate) enum BadIdError {
        BadId,
    }
}

define_suberror! {
    /// `BadParam`
    #[into(CfgError)]
    #[into(CreateThreadError)]
    #[into(SetSchedParamError)]
    #[into(TryLockMutexError)]
    #[into(LockMutexError)]
    #[into(LockMutexPrecheckError)]
    #[into(InitMutexError)]
    #[into(SetMutexCeilingError)]
    #[into(RotateError)]
    pub(crate) enum BadParamError {
        BadParam,
    }
}

define_suberror! {
    /// `BadObjectState`
    #[into(ThreadError)]
    #[into(SetSchedParamError)]
    #[into(WaitError)]
    #[into(TryWaitError)]
    #[into(TryLockMutexError)]
    #[into(LockMutexError)]
    #[into(UnlockMutexError)]
    pub(crate) enum BadObjectStateError {
        BadObjectState,
    }
}

define_suberror! {
    /// Failures of the check every service applies to its calling thread.
    #[into(WaitError)]
    #[into(TryWaitError)]
    #[into(TryLockMutexError)]
    #[into(LockMutexError)]
    #[into(UnlockMutexError)]
    #[into(LockMutexPrecheckError)]
    pub(crate) enum CallerError {
        BadId,
        BadObjectState,
    }
}

define_suberror! {
    /// Some of the error codes shared by [`TryLockMutexError`] and
    /// [`LockMutexError`]. Used internally by the mutex implementation.
    #[into(TryLockMutexError)]
    #[into(LockMutexError)]
    pub(crate) enum LockMutexPrecheckError {
        BadId,
        BadObjectState,
        WouldDeadlock,
        BadParam,
    }
}

/// Convert the outcome of a mutex wait into [`LockMutexError`].
impl From<WaitError> for LockMutexError {
    #[inline]
    fn from(x: WaitError) -> Self {
        match x {
            WaitError::BadId => Self::BadId,
            WaitError::BadObjectState => Self::BadObjectState,
            WaitError::Timeout => Self::Timeout,
            WaitError::Removed => Self::Removed,
            WaitError::Broken => Self::Broken,
        }
    }
}
