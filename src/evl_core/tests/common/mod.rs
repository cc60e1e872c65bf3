#![allow(dead_code)]
use std::sync::Arc;

use evl_core::{cfg::CfgBuilder, Kernel, ManualClock, SchedParam, State, ThreadAttrs, ThreadId};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Make a `State` driven by a manual clock.
pub fn manual_state(num_cpus: usize) -> (State, Arc<ManualClock>) {
    init_logger();
    let clock = Arc::new(ManualClock::new());
    let cfg = CfgBuilder::new()
        .num_cpus(num_cpus)
        .clock(clock.clone())
        .finish()
        .unwrap();
    (State::new(cfg), clock)
}

/// Make a `Kernel` driven by the host's monotonic clock.
pub fn hosted_kernel() -> Kernel {
    init_logger();
    Kernel::new(CfgBuilder::new().finish().unwrap())
}

/// Create and start a thread on CPU 0.
pub fn spawn(st: &mut State, name: &str, param: SchedParam) -> ThreadId {
    spawn_on(st, name, param, 0)
}

pub fn spawn_on(st: &mut State, name: &str, param: SchedParam, cpu: usize) -> ThreadId {
    let t = st
        .create_thread(ThreadAttrs::new(name, param).cpu(cpu))
        .unwrap();
    st.start_thread(t).unwrap();
    t
}

pub fn fifo(prio: i32) -> SchedParam {
    SchedParam::Fifo { prio }
}
