//! Plan error type.

use thiserror::Error;

use mh_core::{ItemId, JobId, LotId, PlanGroupId};

use crate::JobStatus;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("lot {0} already exists")]
    DuplicateLot(LotId),

    #[error("lot {0} not found")]
    UnknownLot(LotId),

    #[error("lot {lot} has no step {step_no}")]
    UnknownStep { lot: LotId, step_no: u32 },

    #[error("lot {lot} step {step_no} is already scheduled as {group}")]
    AlreadyScheduled { lot: LotId, step_no: u32, group: PlanGroupId },

    #[error("job {0} not found")]
    UnknownJob(JobId),

    /// The carrier lookup has no location for a carrier a step needs.
    #[error("carrier {0} has no known location")]
    UnknownCarrier(ItemId),

    #[error("invalid work order: {0}")]
    InvalidWorkOrder(String),

    #[error("job {job}: illegal transition {from} -> {to}")]
    IllegalTransition { job: JobId, from: JobStatus, to: JobStatus },

    #[error("work order parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PlanResult<T> = Result<T, PlanError>;
