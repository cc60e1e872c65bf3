#![doc = include_str!("./lib.md")]
pub mod cfg;
pub mod clock;
pub mod error;
pub mod flag;
mod klock;
pub mod mutex;
pub mod sched;
pub mod sem;
mod state;
pub mod thread;
mod timeout;
mod utils;
pub mod wait;

pub use self::{
    clock::{Clock, Ktime, ManualClock, MonotonicClock, TimeoutMode},
    error::*,
    klock::{Kernel, NkLockGuard},
    mutex::{EvlMutex, MutexId, MutexProtocol},
    sched::{SchedClass, SchedParam},
    state::State,
    thread::{ThreadAttrs, ThreadId, ThreadInfo, ThreadState},
    wait::{WaitPolicy, WaitQueueId},
};
