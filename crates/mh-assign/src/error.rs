//! Assignment error type.

use thiserror::Error;

use mh_store::StoreError;

/// Infrastructure faults only; precondition failures are `Ok(false)`.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error("persisting location failed: {0}")]
    Store(#[from] StoreError),
}

pub type AssignResult<T> = Result<T, AssignError>;
