//! Optional shortest-path layer (feature `routing`).
//!
//! The core graph never picks routes.  Callers that want one opt into this
//! module, which runs Dijkstra over the graph's edge costs.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use mh_core::LocationId;

use crate::{LocationGraph, TopologyError, TopologyResult};

/// An ordered list of hops from source to destination (both included).
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub hops:       Vec<LocationId>,
    pub total_cost: f64,
}

impl Route {
    /// `true` if source and destination are the same location.
    pub fn is_trivial(&self) -> bool {
        self.hops.len() <= 1
    }
}

/// Pluggable routing engine.
pub trait Router: Send + Sync {
    fn route(&self, graph: &LocationGraph, from: &LocationId, to: &LocationId) -> TopologyResult<Route>;
}

/// Standard Dijkstra over edge costs.
pub struct DijkstraRouter;

impl Router for DijkstraRouter {
    fn route(&self, graph: &LocationGraph, from: &LocationId, to: &LocationId) -> TopologyResult<Route> {
        dijkstra(graph, from, to)
    }
}

/// Total order over non-negative, non-NaN costs for the heap.
#[derive(Copy, Clone, PartialEq)]
struct Cost(f64);

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

fn dijkstra(graph: &LocationGraph, from: &LocationId, to: &LocationId) -> TopologyResult<Route> {
    let src = graph.slot(from).ok_or_else(|| TopologyError::NotFound(from.clone()))?;
    let dst = graph.slot(to).ok_or_else(|| TopologyError::NotFound(to.clone()))?;
    if src == dst {
        return Ok(Route { hops: vec![from.clone()], total_cost: 0.0 });
    }

    let n = graph.node_count();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    dist[src] = 0.0;

    // Secondary key (slot) keeps tie-breaking deterministic.
    let mut heap: BinaryHeap<Reverse<(Cost, usize)>> = BinaryHeap::new();
    heap.push(Reverse((Cost(0.0), src)));

    while let Some(Reverse((Cost(cost), node))) = heap.pop() {
        if node == dst {
            return Ok(reconstruct(graph, &prev, dst, cost));
        }
        if cost > dist[node] {
            continue;
        }
        for edge in graph.out_edges_by_slot(node) {
            let Some(next) = graph.slot(&edge.to) else { continue };
            let new_cost = cost + edge.cost;
            if new_cost < dist[next] {
                dist[next] = new_cost;
                prev[next] = Some(node);
                heap.push(Reverse((Cost(new_cost), next)));
            }
        }
    }

    Err(TopologyError::NoRoute { from: from.clone(), to: to.clone() })
}

fn reconstruct(graph: &LocationGraph, prev: &[Option<usize>], dst: usize, total_cost: f64) -> Route {
    let nodes = graph.nodes();
    let mut hops = vec![nodes[dst].clone()];
    let mut cur = dst;
    while let Some(p) = prev[cur] {
        hops.push(nodes[p].clone());
        cur = p;
    }
    hops.reverse();
    Route { hops, total_cost }
}
