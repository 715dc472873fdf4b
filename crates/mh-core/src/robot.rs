//! Robot record.

use crate::{Position, RobotId};

/// A mobile robot and its last persisted position.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Robot {
    pub id:       RobotId,
    pub position: Position,
}

impl Robot {
    pub fn new(id: impl Into<RobotId>, position: Position) -> Self {
        Self { id: id.into(), position }
    }
}
