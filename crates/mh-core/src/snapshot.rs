//! Persisted shape of the location graph.
//!
//! Edges are recorded as declared (one record per `add_edge` call, carrying
//! its `bidirectional` flag) rather than as materialized adjacency, so
//! replaying a snapshot reproduces the same graph without doubling reverse
//! edges.

use crate::LocationId;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeRecord {
    pub from:          LocationId,
    pub to:            LocationId,
    pub cost:          f64,
    pub bidirectional: bool,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<LocationId>,
    pub edges: Vec<EdgeRecord>,
}
