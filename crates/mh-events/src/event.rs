//! Event record and topic taxonomy.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// What changed.  Each kind maps to one publish topic.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LocationAdded,
    NodeAdded,
    EdgeAdded,
    /// Status, current item or child list of a location changed.
    LocationStateChanged,
    CarrierAdded,
    CarrierRelocated,
    LotCreated,
    LotStatusChanged,
    PlanGroupStatusChanged,
    /// A plan was started by its group's strategy.
    PlanAssigned,
    PlanStatusChanged,
    JobStatusChanged,
    RobotPositionChanged,
    /// A job order sent through the publish collaborator.
    DispatchCommand,
}

impl EventKind {
    /// Publish topic for this kind.
    pub fn topic(self) -> &'static str {
        match self {
            EventKind::LocationAdded          => "topology.location_added",
            EventKind::NodeAdded              => "topology.node_added",
            EventKind::EdgeAdded              => "topology.edge_added",
            EventKind::LocationStateChanged   => "location.state_changed",
            EventKind::CarrierAdded           => "transport.carrier_added",
            EventKind::CarrierRelocated       => "transport.carrier_relocated",
            EventKind::LotCreated             => "lot.created",
            EventKind::LotStatusChanged       => "lot.status_changed",
            EventKind::PlanGroupStatusChanged => "plan_group.status_changed",
            EventKind::PlanAssigned           => "plan.assigned",
            EventKind::PlanStatusChanged      => "plan.status_changed",
            EventKind::JobStatusChanged       => "job.status_changed",
            EventKind::RobotPositionChanged   => "robot.position_changed",
            EventKind::DispatchCommand        => "dispatch.command",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

/// One externally observable state change.
///
/// `seq` is assigned by the relay and strictly increases across all events
/// emitted through the same relay.  `old` is `Value::Null` for creations.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateEvent {
    pub seq:       u64,
    pub kind:      EventKind,
    pub entity_id: String,
    pub old:       Value,
    pub new:       Value,
    pub at:        DateTime<Utc>,
}

impl StateEvent {
    #[inline]
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }

    /// JSON payload handed to the publish collaborator.
    pub fn payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Encode a record for an event's `old`/`new` field.
///
/// Every record type in the framework serializes infallibly; anything that
/// does not is reported as `null` rather than dropping the event.
pub fn json_value<T: serde::Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
