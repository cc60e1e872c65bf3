use evl_core::{Ktime, RotateError, SchedClass, SchedParam, ThreadState};

mod common;
use common::{fifo, manual_state, spawn, spawn_on};

#[test]
fn rt_outranks_fifo() {
    let (mut st, _clock) = manual_state(1);
    let f = spawn(&mut st, "f", fifo(99));
    let r = spawn(&mut st, "r", SchedParam::Rt { prio: 1 });

    assert_eq!(st.schedule(0), Some(r));
    assert!(st.thread(f).unwrap().state().contains(ThreadState::READY));
    assert_eq!(st.run_queue(0).runnable(SchedClass::Fifo).len(), 1);
    assert!(
        st.thread(r).unwrap().wprio() > st.thread(f).unwrap().wprio(),
        "class weight dominates the priority"
    );

    st.exit_thread(r).unwrap();
    assert_eq!(st.schedule(0), Some(f));
}

#[test]
fn equal_priorities_run_in_arrival_order() {
    let (mut st, _clock) = manual_state(1);
    let a = spawn(&mut st, "a", fifo(10));
    let b = spawn(&mut st, "b", fifo(10));
    let c = spawn(&mut st, "c", fifo(10));

    assert_eq!(st.schedule(0), Some(a));
    // Without round-robin, the current thread keeps the CPU
    st.account_rr(0, Ktime::from_millis(100));
    st.sched_tick(0);
    assert_eq!(st.schedule(0), Some(a));

    st.rotate(0, SchedClass::Fifo, 10).unwrap();
    assert_eq!(st.schedule(0), Some(b));
    st.rotate(0, SchedClass::Fifo, 10).unwrap();
    assert_eq!(st.schedule(0), Some(c));
    st.rotate(0, SchedClass::Fifo, 10).unwrap();
    assert_eq!(st.schedule(0), Some(a));
}

#[test]
fn rotate_rejects_bad_levels() {
    let (mut st, _clock) = manual_state(1);
    let a = spawn(&mut st, "a", fifo(10));
    let b = spawn(&mut st, "b", fifo(10));
    assert_eq!(st.schedule(0), Some(a));

    assert_eq!(
        st.rotate(0, SchedClass::Fifo, 500),
        Err(RotateError::BadParam)
    );
    assert_eq!(st.rotate(0, SchedClass::Rt, -1), Err(RotateError::BadParam));
    assert_eq!(st.rotate(1, SchedClass::Fifo, 10), Err(RotateError::BadParam));
    // Nothing moved
    assert!(!st.run_queue(0).needs_resched());
    assert_eq!(st.schedule(0), Some(a));

    // An empty level is a valid no-op
    assert_eq!(st.rotate(0, SchedClass::Rt, 101), Ok(()));
    assert_eq!(st.rotate(0, SchedClass::Fifo, 10), Ok(()));
    assert_eq!(st.schedule(0), Some(b));
}

#[test]
fn round_robin_alternates() {
    let (mut st, _clock) = manual_state(1);
    let quantum = Ktime::from_millis(1);
    let a = spawn(&mut st, "a", SchedParam::Rr { prio: 10, quantum });
    let b = spawn(&mut st, "b", SchedParam::Rr { prio: 10, quantum });

    assert_eq!(st.schedule(0), Some(a));
    let mut order = vec![a];
    for _ in 0..4 {
        st.account_rr(0, Ktime::from_micros(500));
        assert_eq!(st.schedule(0), order.last().copied());
        st.account_rr(0, Ktime::from_micros(500));
        order.push(st.schedule(0).unwrap());
    }
    assert_eq!(order, [a, b, a, b, a]);
    assert_eq!(st.run_queue(0).nr_switches(), 5);
    assert_eq!(
        st.get_schedparam(a),
        Some(SchedParam::Rr { prio: 10, quantum })
    );
}

#[test]
fn default_quantum() {
    let (mut st, _clock) = manual_state(1);
    let a = spawn(
        &mut st,
        "a",
        SchedParam::Rr {
            prio: 5,
            quantum: Ktime::ZERO,
        },
    );
    assert_eq!(
        st.get_schedparam(a),
        Some(SchedParam::Rr {
            prio: 5,
            quantum: st.cfg().rr_quantum(),
        })
    );

    st.set_schedparam(a, fifo(5)).unwrap();
    assert_eq!(st.get_schedparam(a), Some(fifo(5)));
    assert!(!st.thread(a).unwrap().state().contains(ThreadState::RRB));
}

#[test]
fn cpus_are_independent() {
    let (mut st, _clock) = manual_state(2);
    let a = spawn_on(&mut st, "a", fifo(10), 0);
    let b = spawn_on(&mut st, "b", fifo(20), 1);

    assert_eq!(st.schedule(0), Some(a));
    assert_eq!(st.schedule(1), Some(b));
    assert_eq!(st.run_queue(0).nr_runnable(), 0);

    st.hold_thread(a).unwrap();
    assert!(st.run_queue(0).needs_resched());
    assert!(!st.run_queue(1).needs_resched());
    assert_eq!(st.schedule(0), None);
    assert_eq!(st.schedule(1), Some(b));

    st.release_thread(a).unwrap();
    assert_eq!(st.schedule(0), Some(a));
}
