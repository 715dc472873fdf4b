//! Topology error type.

use thiserror::Error;

use mh_core::{CoreError, LocationId};

/// Errors produced by `mh-topology`.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("location {0} already exists")]
    DuplicateId(LocationId),

    #[error("location {0} not found")]
    NotFound(LocationId),

    #[error("invalid edge {from} -> {to}: cost {cost} must be non-negative")]
    InvalidEdge { from: LocationId, to: LocationId, cost: f64 },

    #[error("invalid location {id}: {reason}")]
    InvalidLocation { id: LocationId, reason: String },

    #[error("layout parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "routing")]
    #[error("no route from {from} to {to}")]
    NoRoute { from: LocationId, to: LocationId },
}

pub type TopologyResult<T> = Result<T, TopologyError>;
