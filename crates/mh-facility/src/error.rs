//! Facility error type.

use thiserror::Error;

use mh_assign::AssignError;
use mh_core::{CoreError, ItemId, JobId, LocationId, RobotId};
use mh_events::EventError;
use mh_motion::MotionError;
use mh_plan::PlanError;
use mh_store::StoreError;
use mh_topology::TopologyError;
use mh_transport::TransportError;

/// Errors produced while building or running a [`Facility`][crate::Facility].
#[derive(Debug, Error)]
pub enum FacilityError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Assign(#[from] AssignError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Publish(#[from] EventError),

    /// A carrier names a location that is already holding something else.
    #[error("carrier {item} cannot be placed at {location}: holding {holder}")]
    PlacementConflict { item: ItemId, location: LocationId, holder: ItemId },

    #[error("robot {0} declared twice")]
    DuplicateRobot(RobotId),

    #[error("job {job} aborted: {reason}")]
    JobAborted { job: JobId, reason: String },

    #[error("dispatcher has no robots")]
    NoRobots,

    #[error("facility is already running")]
    AlreadyRunning,
}

pub type FacilityResult<T> = Result<T, FacilityError>;
