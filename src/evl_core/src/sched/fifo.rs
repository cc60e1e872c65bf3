//! The FIFO class (`SCHED_FIFO`, plus round-robin time slicing)
use super::{
    private::Sealed, MultiLevelQueue, RunQueue, SchedClassOps, SchedParam, CORE_MAX_PRIO,
    CORE_MIN_PRIO, FIFO_MAX_PRIO, FIFO_MIN_PRIO,
};
use crate::{
    clock::Ktime,
    error::BadParamError,
    thread::{ThreadCb, ThreadState},
};

/// The weight of [`super::SchedClass::Fifo`].
pub(super) const FIFO_WEIGHT: i32 = 1;

#[derive(Debug)]
pub(super) struct FifoClass;

impl Sealed for FifoClass {}

impl SchedClassOps for FifoClass {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn weight(&self) -> i32 {
        FIFO_WEIGHT
    }

    fn runnable<'a>(&self, rq: &'a RunQueue) -> &'a MultiLevelQueue {
        &rq.fifo
    }

    fn runnable_mut<'a>(&self, rq: &'a mut RunQueue) -> &'a mut MultiLevelQueue {
        &mut rq.fifo
    }

    fn chkparam(&self, thread: &ThreadCb, param: &SchedParam) -> Result<(), BadParamError> {
        // User threads are restricted to the POSIX range
        let range = if thread.state.contains(ThreadState::USER) {
            FIFO_MIN_PRIO..=FIFO_MAX_PRIO
        } else {
            CORE_MIN_PRIO..=CORE_MAX_PRIO
        };
        match *param {
            SchedParam::Fifo { prio } if range.contains(&prio) => Ok(()),
            SchedParam::Rr { prio, quantum } if range.contains(&prio) && quantum != Ktime::ZERO => {
                Ok(())
            }
            _ => Err(BadParamError::BadParam),
        }
    }

    fn setparam(&self, thread: &mut ThreadCb, param: &SchedParam) {
        thread.bprio = param.prio();
        if !thread.state.contains(ThreadState::BOOST) {
            thread.cprio = thread.bprio;
        }
        match *param {
            SchedParam::Rr { quantum, .. } => {
                thread.state.insert(ThreadState::RRB);
                thread.rrperiod = quantum;
                thread.rrcredit = quantum;
            }
            _ => {
                thread.state.remove(ThreadState::RRB);
                thread.rrperiod = Ktime::ZERO;
            }
        }
    }

    fn getparam(&self, thread: &ThreadCb) -> SchedParam {
        if thread.state.contains(ThreadState::RRB) {
            SchedParam::Rr {
                prio: thread.cprio,
                quantum: thread.rrperiod,
            }
        } else {
            SchedParam::Fifo {
                prio: thread.cprio,
            }
        }
    }

    fn trackprio(&self, thread: &mut ThreadCb, prio: Option<i32>) {
        thread.cprio = prio.unwrap_or(thread.bprio);
    }

    fn clamp_ceiling(&self, prio: i32) -> i32 {
        prio.min(FIFO_MAX_PRIO)
    }
}
