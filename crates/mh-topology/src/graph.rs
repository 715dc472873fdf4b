//! The location graph.
//!
//! # Data layout
//!
//! Nodes are kept in insertion order in `nodes`; `slots` maps each id to its
//! position.  Outgoing edges of a node live in `adjacency[slot]`, again in
//! insertion order, so `neighbors` is a contiguous slice with no allocation.
//!
//! Alongside the materialized adjacency the graph keeps the list of edges as
//! they were *declared* (one record per `add_edge` call).  Snapshots store
//! the declared list so a bidirectional edge is replayed once, not twice.
//!
//! The graph is add-only: there is no node or edge removal.

use std::collections::HashMap;

use mh_core::{EdgeRecord, GraphSnapshot, LocationId};

use crate::{TopologyError, TopologyResult};

/// One materialized, directed edge.
///
/// The reverse half of a bidirectional declaration carries
/// `bidirectional = true` as well.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub from:          LocationId,
    pub to:            LocationId,
    pub cost:          f64,
    pub bidirectional: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LocationGraph {
    nodes:     Vec<LocationId>,
    slots:     HashMap<LocationId, usize>,
    adjacency: Vec<Vec<Edge>>,
    declared:  Vec<EdgeRecord>,
}

impl LocationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Dimensions ────────────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of materialized (directed) edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &LocationId) -> bool {
        self.slots.contains_key(id)
    }

    /// Node ids in registration order.
    pub fn nodes(&self) -> &[LocationId] {
        &self.nodes
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    /// Register `id` as a node.  Idempotent; returns `true` if it was new.
    pub fn add_node(&mut self, id: LocationId) -> bool {
        if self.slots.contains_key(&id) {
            return false;
        }
        self.slots.insert(id.clone(), self.nodes.len());
        self.nodes.push(id);
        self.adjacency.push(Vec::new());
        true
    }

    /// Add an edge, registering missing endpoints as nodes.
    ///
    /// A bidirectional edge also materializes `to → from` with the same cost.
    /// Negative or NaN costs are rejected before anything is registered.
    pub fn add_edge(
        &mut self,
        from:          LocationId,
        to:            LocationId,
        cost:          f64,
        bidirectional: bool,
    ) -> TopologyResult<()> {
        if cost.is_nan() || cost < 0.0 {
            return Err(TopologyError::InvalidEdge { from, to, cost });
        }

        self.add_node(from.clone());
        self.add_node(to.clone());

        self.push_edge(Edge { from: from.clone(), to: to.clone(), cost, bidirectional });
        if bidirectional {
            self.push_edge(Edge { from: to.clone(), to: from.clone(), cost, bidirectional });
        }
        self.declared.push(EdgeRecord { from, to, cost, bidirectional });
        Ok(())
    }

    fn push_edge(&mut self, edge: Edge) {
        let slot = self.slots[&edge.from];
        self.adjacency[slot].push(edge);
    }

    // ── Traversal ─────────────────────────────────────────────────────────

    /// Outgoing edges of `id` in insertion order.
    ///
    /// Unknown and isolated nodes both yield an empty slice.
    pub fn neighbors(&self, id: &LocationId) -> &[Edge] {
        match self.slots.get(id) {
            Some(&slot) => &self.adjacency[slot],
            None        => &[],
        }
    }

    /// Every materialized edge, grouped by source node in registration order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency.iter().flatten()
    }

    pub(crate) fn slot(&self, id: &LocationId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub(crate) fn out_edges_by_slot(&self, slot: usize) -> &[Edge] {
        &self.adjacency[slot]
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self.declared.clone(),
        }
    }

    /// Rebuild a graph by replaying a snapshot.
    ///
    /// Fails with `InvalidEdge` on a negative cost and `NotFound` on an edge
    /// endpoint missing from the snapshot's node list.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> TopologyResult<Self> {
        let mut graph = Self::new();
        for id in &snapshot.nodes {
            graph.add_node(id.clone());
        }
        for e in &snapshot.edges {
            for endpoint in [&e.from, &e.to] {
                if !graph.contains(endpoint) {
                    return Err(TopologyError::NotFound(endpoint.clone()));
                }
            }
            graph.add_edge(e.from.clone(), e.to.clone(), e.cost, e.bidirectional)?;
        }
        Ok(graph)
    }
}
