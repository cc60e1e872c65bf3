//! The core real-time class
use super::{
    private::Sealed, MultiLevelQueue, RunQueue, SchedClassOps, SchedParam, CORE_MAX_PRIO,
    CORE_MIN_PRIO,
};
use crate::{
    error::BadParamError,
    thread::{ThreadCb, ThreadState},
};

/// The weight of [`super::SchedClass::Rt`].
pub(super) const RT_WEIGHT: i32 = 2;

/// Fixed-priority class covering the whole core scale, used by core-internal
/// threads. Threads of this class are never time-sliced.
#[derive(Debug)]
pub(super) struct RtClass;

impl Sealed for RtClass {}

impl SchedClassOps for RtClass {
    fn name(&self) -> &'static str {
        "rt"
    }

    fn weight(&self) -> i32 {
        RT_WEIGHT
    }

    fn runnable<'a>(&self, rq: &'a RunQueue) -> &'a MultiLevelQueue {
        &rq.rt
    }

    fn runnable_mut<'a>(&self, rq: &'a mut RunQueue) -> &'a mut MultiLevelQueue {
        &mut rq.rt
    }

    fn chkparam(&self, _thread: &ThreadCb, param: &SchedParam) -> Result<(), BadParamError> {
        match *param {
            SchedParam::Rt { prio } if (CORE_MIN_PRIO..=CORE_MAX_PRIO).contains(&prio) => Ok(()),
            _ => Err(BadParamError::BadParam),
        }
    }

    fn setparam(&self, thread: &mut ThreadCb, param: &SchedParam) {
        thread.bprio = param.prio();
        if !thread.state.contains(ThreadState::BOOST) {
            thread.cprio = thread.bprio;
        }
        thread.state.remove(ThreadState::RRB);
    }

    fn getparam(&self, thread: &ThreadCb) -> SchedParam {
        SchedParam::Rt {
            prio: thread.cprio,
        }
    }

    fn trackprio(&self, thread: &mut ThreadCb, prio: Option<i32>) {
        thread.cprio = prio.unwrap_or(thread.bprio);
    }
}
