//! Motion error type.

use thiserror::Error;

use mh_core::{CoreError, Position, RobotId};
use mh_store::StoreError;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("speed must be positive and finite, got {0}")]
    InvalidSpeed(f64),

    #[error("target {0} must be finite and non-negative")]
    InvalidTarget(Position),

    #[error("robot {0} not found")]
    UnknownRobot(RobotId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] CoreError),
}

pub type MotionResult<T> = Result<T, MotionError>;
