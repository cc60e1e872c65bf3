use evl_core::{
    Ktime, ObjectError, SchedClass, ThreadId, ThreadInfo, TimeoutMode, WaitError, WaitPolicy,
};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

mod common;
use common::{fifo, manual_state, spawn};

#[test]
fn flush_fifo_queue_on_removal() {
    let (mut st, _clock) = manual_state(1);
    let wq = st.init_wait("wq", WaitPolicy::Fifo);
    let threads: Vec<_> = ["t1", "t2", "t3"]
        .iter()
        .map(|name| spawn(&mut st, name, fifo(10)))
        .collect();
    for &t in threads.iter() {
        st.add_wait_queue(t, wq, Ktime::INFINITE, TimeoutMode::Rel)
            .unwrap();
        assert!(st.thread(t).unwrap().is_blocked());
    }
    assert_eq!(st.run_queue(0).nr_runnable(), 0);
    assert_eq!(st.waiters(wq).unwrap(), threads);
    assert_eq!(st.wait_result(threads[0]), Err(WaitError::BadObjectState));

    assert_eq!(st.destroy_wait(wq), Ok(3));
    for &t in threads.iter() {
        assert_eq!(st.wait_result(t), Err(WaitError::Removed));
        assert!(st.thread(t).unwrap().info().contains(ThreadInfo::RMID));
        assert!(st.thread(t).unwrap().wchan().is_none());
    }
    assert_eq!(st.wait_active(wq), Err(ObjectError::BadId));
    assert_eq!(st.destroy_wait(wq), Err(ObjectError::BadId));

    // Woken up in list order, so queued in that order
    let runnable: Vec<_> = st
        .run_queue(0)
        .runnable(SchedClass::Fifo)
        .level(10)
        .collect();
    assert_eq!(runnable, threads);
}

#[test]
fn destroy_empty_queue() {
    let (mut st, _clock) = manual_state(1);
    let wq = st.init_wait("wq", WaitPolicy::Prio);
    assert_eq!(st.wait_active(wq), Ok(false));
    assert_eq!(st.destroy_wait(wq), Ok(0));
    assert!(st.wait_queue(wq).is_none());
}

#[test]
fn timed_waits_expire_in_date_order() {
    let (mut st, clock) = manual_state(1);
    let wq = st.init_wait("wq", WaitPolicy::Prio);
    let a = spawn(&mut st, "a", fifo(10));
    let b = spawn(&mut st, "b", fifo(20));
    let c = spawn(&mut st, "c", fifo(30));

    st.add_wait_queue(a, wq, Ktime::from_millis(3), TimeoutMode::Rel)
        .unwrap();
    st.add_wait_queue(b, wq, Ktime::from_millis(1), TimeoutMode::Abs)
        .unwrap();
    st.add_wait_queue(c, wq, Ktime::INFINITE, TimeoutMode::Rel)
        .unwrap();
    assert_eq!(st.nr_timers(), 2);
    assert_eq!(st.thread_timeout(b), Some(Ktime::from_millis(1)));
    assert_eq!(st.thread_timeout(c), None);

    clock.advance(Ktime::from_millis(2));
    assert_eq!(st.expire_timers(), 1);
    assert_eq!(st.wait_result(b), Err(WaitError::Timeout));
    assert_eq!(st.waiters(wq).unwrap(), [c, a]);

    // A past date times out on the spot
    let d = spawn(&mut st, "d", fifo(5));
    st.add_wait_queue(d, wq, Ktime::from_millis(1), TimeoutMode::Abs)
        .unwrap();
    assert!(!st.thread(d).unwrap().is_blocked());
    assert_eq!(st.wait_result(d), Err(WaitError::Timeout));

    // Waking up cancels the timer
    assert_eq!(st.wake_up(wq, Some(a), ThreadInfo::WAKEN), Ok(Some(a)));
    assert_eq!(st.wait_result(a), Ok(()));
    assert_eq!(st.nr_timers(), 0);
    clock.advance(Ktime::from_millis(10));
    assert_eq!(st.expire_timers(), 0);
    assert_eq!(st.wait_head(wq), Ok(Some(c)));
}

#[test]
fn kick_breaks_a_wait() {
    let (mut st, _clock) = manual_state(1);
    let wq = st.init_wait("wq", WaitPolicy::Prio);
    let a = spawn(&mut st, "a", fifo(10));
    st.add_wait_queue(a, wq, Ktime::INFINITE, TimeoutMode::Rel)
        .unwrap();

    st.kick_thread(a).unwrap();
    assert_eq!(st.wait_result(a), Err(WaitError::Broken));
    assert!(st.thread(a).unwrap().info().contains(ThreadInfo::KICKED));
    assert_eq!(st.wait_active(wq), Ok(false));
    assert_eq!(st.wake_up_head(wq), Ok(None));
}

/// Sleepers of a priority-ordered queue are woken up by decreasing priority,
/// then by arrival, including after one of them changed priority while
/// waiting.
#[quickcheck]
fn priority_wake_order(prios: Vec<u8>, bump: (usize, u8)) -> TestResult {
    let prios: Vec<i32> = prios.iter().take(48).map(|&p| 1 + p as i32 % 99).collect();
    if prios.is_empty() {
        return TestResult::discard();
    }

    let (mut st, _clock) = manual_state(1);
    let wq = st.init_wait("wq", WaitPolicy::Prio);
    let threads: Vec<_> = prios
        .iter()
        .map(|&prio| spawn(&mut st, "t", fifo(prio)))
        .collect();
    for &t in threads.iter() {
        st.add_wait_queue(t, wq, Ktime::INFINITE, TimeoutMode::Rel)
            .unwrap();
    }

    let bumped = threads[bump.0 % threads.len()];
    let new_prio = 1 + bump.1 as i32 % 99;
    st.set_schedparam(bumped, fifo(new_prio)).unwrap();

    let order = st.waiters(wq).unwrap();
    assert_eq!(order.len(), threads.len());
    let prio_of = |t: ThreadId| st.thread(t).unwrap().priority();
    let arrival = |t: ThreadId| threads.iter().position(|&x| x == t).unwrap();
    for w in order.windows(2) {
        let (p0, p1) = (prio_of(w[0]), prio_of(w[1]));
        assert!(p0 >= p1, "{order:?}");
        if p0 == p1 && w[0] != bumped && w[1] != bumped {
            assert!(arrival(w[0]) < arrival(w[1]), "{order:?}");
        }
    }

    let mut woken = Vec::new();
    while let Some(t) = st.wake_up_head(wq).unwrap() {
        assert_eq!(st.wait_result(t), Ok(()));
        woken.push(t);
    }
    assert_eq!(woken, order);
    TestResult::passed()
}
