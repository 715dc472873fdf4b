//! `TopologyStore` — the in-memory location index plus the location graph.
//!
//! # Locking
//!
//! * The id → cell map and the graph sit behind `parking_lot::RwLock`s and
//!   are never held across an await.
//! * Each location lives in its own [`LocationCell`].  The cell's async
//!   `gate` serializes read-modify-persist-commit sequences on that one
//!   location (the assignment engine holds it across its store write); the
//!   committed record itself is behind a short `RwLock`, so plain reads never
//!   wait for a pending store write.
//!
//! # Spatial index
//!
//! An R-tree (via `rstar`) over location x/y answers "which location is
//! nearest to this robot" queries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde_json::{Value, json};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use mh_core::{GraphSnapshot, Location, LocationId, LocationKind, Position};
use mh_events::{EventKind, EventRelay, json_value};

use crate::{Edge, LocationGraph, TopologyError, TopologyResult};

// ── R-tree entry ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct LocationEntry {
    point: [f64; 2],
    id:    LocationId,
    kind:  LocationKind,
}

impl RTreeObject for LocationEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for LocationEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ── LocationCell ──────────────────────────────────────────────────────────────

/// One location's committed record and its mutation gate.
pub struct LocationCell {
    gate:   Mutex<()>,
    record: RwLock<Location>,
}

impl LocationCell {
    fn new(location: Location) -> Self {
        Self { gate: Mutex::new(()), record: RwLock::new(location) }
    }

    /// Copy of the committed record.
    pub fn snapshot(&self) -> Location {
        self.record.read().clone()
    }

    /// Wait for exclusive mutation rights on this location.
    pub async fn lock(&self) -> LocationGuard<'_> {
        LocationGuard { cell: self, _gate: self.gate.lock().await }
    }
}

/// Exclusive mutation rights on one location.  Dropping it releases the gate.
pub struct LocationGuard<'a> {
    cell:  &'a LocationCell,
    _gate: MutexGuard<'a, ()>,
}

impl LocationGuard<'_> {
    pub fn current(&self) -> Location {
        self.cell.snapshot()
    }

    /// Replace the committed record.  The id must not change.
    pub fn commit(&mut self, location: Location) {
        debug_assert_eq!(self.cell.record.read().id, location.id);
        *self.cell.record.write() = location;
    }
}

// ── TopologyStore ─────────────────────────────────────────────────────────────

/// Explicitly owned registry of every location and the routing graph.
///
/// Build one per facility (see `FacilityLayout`) and share it by `Arc`.
pub struct TopologyStore {
    cells:   RwLock<HashMap<LocationId, Arc<LocationCell>>>,
    graph:   RwLock<LocationGraph>,
    spatial: RwLock<RTree<LocationEntry>>,
    events:  EventRelay,
}

impl TopologyStore {
    /// An empty store.
    pub fn new(events: EventRelay) -> Self {
        Self {
            cells:   RwLock::new(HashMap::new()),
            graph:   RwLock::new(LocationGraph::new()),
            spatial: RwLock::new(RTree::new()),
            events,
        }
    }

    /// Bulk provisioning: install `locations` and `graph` in one step.
    ///
    /// No events are emitted; provisioning is not a state change.  Every
    /// location is validated exactly as `add_location` would.
    pub fn from_parts(
        locations: Vec<Location>,
        graph:     LocationGraph,
        events:    EventRelay,
    ) -> TopologyResult<Self> {
        let mut cells   = HashMap::with_capacity(locations.len());
        let mut entries = Vec::with_capacity(locations.len());
        for location in locations {
            validate(&location)?;
            if cells.contains_key(&location.id) {
                return Err(TopologyError::DuplicateId(location.id));
            }
            entries.push(entry_for(&location));
            cells.insert(location.id.clone(), Arc::new(LocationCell::new(location)));
        }
        debug!(locations = cells.len(), nodes = graph.node_count(), edges = graph.edge_count(), "topology provisioned");
        Ok(Self {
            cells:   RwLock::new(cells),
            graph:   RwLock::new(graph),
            spatial: RwLock::new(RTree::bulk_load(entries)),
            events,
        })
    }

    // ── Locations ─────────────────────────────────────────────────────────

    /// Register a new location.
    ///
    /// Fails with `DuplicateId` if the id is taken and `InvalidLocation` if
    /// the record breaks the Occupied⇔item invariant or has a non-finite
    /// position.  If the parent is already registered, the new id is
    /// appended to the parent's children and the parent gets its own
    /// `LocationStateChanged` event carrying both child lists.
    pub fn add_location(&self, location: Location) -> TopologyResult<()> {
        validate(&location)?;
        let linked = {
            let mut cells = self.cells.write();
            if cells.contains_key(&location.id) {
                return Err(TopologyError::DuplicateId(location.id));
            }
            let mut linked = None;
            if let Some(parent) = location.parent.as_ref().and_then(|p| cells.get(p)) {
                let mut record = parent.record.write();
                if !record.children.contains(&location.id) {
                    let old = record.children.clone();
                    record.children.push(location.id.clone());
                    linked = Some((record.id.clone(), old, record.children.clone()));
                }
            }
            self.spatial.write().insert(entry_for(&location));
            cells.insert(location.id.clone(), Arc::new(LocationCell::new(location.clone())));
            linked
        };
        self.events.emit(EventKind::LocationAdded, location.id.as_str(), Value::Null, json_value(&location));
        if let Some((parent, old, new)) = linked {
            self.events.emit(
                EventKind::LocationStateChanged,
                parent.as_str(),
                json!({ "children": old }),
                json!({ "children": new }),
            );
        }
        Ok(())
    }

    /// Copy of the current record, or `NotFound`.
    pub fn get_location(&self, id: &LocationId) -> TopologyResult<Location> {
        self.cell(id)
            .map(|c| c.snapshot())
            .ok_or_else(|| TopologyError::NotFound(id.clone()))
    }

    /// Shared handle to a location's cell for gated mutation.
    pub fn cell(&self, id: &LocationId) -> Option<Arc<LocationCell>> {
        self.cells.read().get(id).cloned()
    }

    pub fn contains(&self, id: &LocationId) -> bool {
        self.cells.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Copies of every location, ordered by id.
    pub fn locations(&self) -> Vec<Location> {
        let mut all: Vec<Location> = self.cells.read().values().map(|c| c.snapshot()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Copies of every location of `kind`, ordered by id.
    pub fn locations_of_kind(&self, kind: LocationKind) -> Vec<Location> {
        self.locations().into_iter().filter(|l| l.kind == kind).collect()
    }

    pub fn children_of(&self, id: &LocationId) -> TopologyResult<Vec<LocationId>> {
        self.get_location(id).map(|l| l.children)
    }

    /// Nearest location to `position` in the x/y plane, optionally limited
    /// to one kind.
    pub fn nearest_location(&self, position: Position, kind: Option<LocationKind>) -> Option<LocationId> {
        self.spatial
            .read()
            .nearest_neighbor_iter(&[position.x, position.y])
            .find(|e| kind.is_none_or(|k| e.kind == k))
            .map(|e| e.id.clone())
    }

    // ── Graph ─────────────────────────────────────────────────────────────

    /// Register a graph node.  Idempotent; only a new node emits an event.
    pub fn add_node(&self, id: LocationId) -> bool {
        let added = self.graph.write().add_node(id.clone());
        if added {
            self.events.emit(EventKind::NodeAdded, id.as_str(), Value::Null, json!(id));
        }
        added
    }

    /// Add an edge (see [`LocationGraph::add_edge`]).  One event per call,
    /// including any auto-registered endpoints.
    pub fn add_edge(
        &self,
        from:          LocationId,
        to:            LocationId,
        cost:          f64,
        bidirectional: bool,
    ) -> TopologyResult<()> {
        let entity = format!("{from}->{to}");
        self.graph.write().add_edge(from.clone(), to.clone(), cost, bidirectional)?;
        self.events.emit(
            EventKind::EdgeAdded,
            entity,
            Value::Null,
            json!({ "from": from, "to": to, "cost": cost, "bidirectional": bidirectional }),
        );
        Ok(())
    }

    /// Outgoing edges of `id`; empty for unknown or isolated nodes.
    pub fn neighbors(&self, id: &LocationId) -> Vec<Edge> {
        self.graph.read().neighbors(id).to_vec()
    }

    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.graph.read().snapshot()
    }

    /// Run `f` with read access to the graph (e.g. for a router).
    pub fn with_graph<T>(&self, f: impl FnOnce(&LocationGraph) -> T) -> T {
        f(&self.graph.read())
    }

    pub fn events(&self) -> &EventRelay {
        &self.events
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn entry_for(location: &Location) -> LocationEntry {
    LocationEntry {
        point: [location.position.x, location.position.y],
        id:    location.id.clone(),
        kind:  location.kind,
    }
}

fn validate(location: &Location) -> TopologyResult<()> {
    if !location.is_consistent() {
        return Err(TopologyError::InvalidLocation {
            id:     location.id.clone(),
            reason: format!(
                "status {} disagrees with current item {:?}",
                location.status, location.current_item
            ),
        });
    }
    if !location.position.is_finite() {
        return Err(TopologyError::InvalidLocation {
            id:     location.id.clone(),
            reason: format!("non-finite position {}", location.position),
        });
    }
    Ok(())
}
