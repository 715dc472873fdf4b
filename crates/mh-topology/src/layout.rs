//! Facility layout: the one documented bulk-load step for topology.
//!
//! # CSV format
//!
//! `locations.csv` — one row per location.  `parent` may be empty.
//!
//! ```csv
//! id,name,kind,x,y,z,parent
//! stk-1,Stocker 1,cassette_port,0,0,0,
//! stk-1.s1,Stocker 1 slot 1,carrier_slot,0,0,0.2,stk-1
//! lp-1,Load port 1,cassette_port,10,0,0,
//! ```
//!
//! `edges.csv` — one row per declared edge.
//!
//! ```csv
//! from,to,cost,bidirectional
//! stk-1,lp-1,10,true
//! ```
//!
//! Every location id becomes a graph node (in file order) before any edge
//! is added.  Child lists are derived from the `parent` column in file
//! order; a `parent` naming an unknown id is a parse error.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use mh_core::{Location, LocationId, LocationKind, Position};
use mh_events::EventRelay;

use crate::{LocationGraph, TopologyError, TopologyResult, TopologyStore};

// ── CSV records ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LocationRecord {
    id:     String,
    name:   String,
    kind:   String,
    x:      f64,
    y:      f64,
    z:      f64,
    parent: Option<String>,
}

#[derive(Deserialize)]
struct EdgeRow {
    from:          String,
    to:            String,
    cost:          f64,
    bidirectional: bool,
}

// ── FacilityLayout ────────────────────────────────────────────────────────────

/// Locations plus graph, validated and ready to provision a
/// [`TopologyStore`].
#[derive(Clone, Debug, Default)]
pub struct FacilityLayout {
    pub locations: Vec<Location>,
    pub graph:     LocationGraph,
}

impl FacilityLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a location and register it as a graph node.
    pub fn location(mut self, location: Location) -> Self {
        self.graph.add_node(location.id.clone());
        self.locations.push(location);
        self
    }

    /// Declare an edge.
    pub fn edge(
        mut self,
        from:          impl Into<LocationId>,
        to:            impl Into<LocationId>,
        cost:          f64,
        bidirectional: bool,
    ) -> TopologyResult<Self> {
        self.graph.add_edge(from.into(), to.into(), cost, bidirectional)?;
        Ok(self)
    }

    /// Check id uniqueness and parent references, then fill every parent's
    /// `children` list from the children's `parent` links.
    pub fn resolve_links(mut self) -> TopologyResult<Self> {
        let mut seen = HashSet::with_capacity(self.locations.len());
        for l in &self.locations {
            if !seen.insert(l.id.clone()) {
                return Err(TopologyError::DuplicateId(l.id.clone()));
            }
        }

        let mut children: HashMap<LocationId, Vec<LocationId>> = HashMap::new();
        for l in &self.locations {
            if let Some(parent) = &l.parent {
                if !seen.contains(parent) {
                    return Err(TopologyError::Parse(format!(
                        "location {} names unknown parent {parent}",
                        l.id
                    )));
                }
                children.entry(parent.clone()).or_default().push(l.id.clone());
            }
        }
        for l in &mut self.locations {
            for child in children.remove(&l.id).unwrap_or_default() {
                if !l.children.contains(&child) {
                    l.children.push(child);
                }
            }
        }
        Ok(self)
    }

    /// Consume the layout and build the topology store.
    pub fn into_store(self, events: EventRelay) -> TopologyResult<TopologyStore> {
        let layout = self.resolve_links()?;
        TopologyStore::from_parts(layout.locations, layout.graph, events)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load a layout from a pair of CSV files.
pub fn load_layout_csv(locations: &Path, edges: &Path) -> TopologyResult<FacilityLayout> {
    let loc_file  = std::fs::File::open(locations)?;
    let edge_file = std::fs::File::open(edges)?;
    load_layout_readers(loc_file, edge_file)
}

/// Like [`load_layout_csv`] but accepts any `Read` sources.
///
/// Useful for testing (pass a `std::io::Cursor`) or embedded layouts.
pub fn load_layout_readers<L: Read, E: Read>(locations: L, edges: E) -> TopologyResult<FacilityLayout> {
    let mut layout = FacilityLayout::new();

    let mut loc_reader = csv::Reader::from_reader(locations);
    for result in loc_reader.deserialize::<LocationRecord>() {
        let row = result.map_err(|e| TopologyError::Parse(e.to_string()))?;
        let kind: LocationKind = row.kind.parse()?;
        let mut location = Location::new(
            row.id,
            row.name,
            kind,
            Position::new(row.x, row.y, row.z),
        );
        location.parent = row
            .parent
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .map(LocationId::from);
        layout = layout.location(location);
    }

    let mut edge_reader = csv::Reader::from_reader(edges);
    for result in edge_reader.deserialize::<EdgeRow>() {
        let row = result.map_err(|e| TopologyError::Parse(e.to_string()))?;
        layout = layout.edge(row.from, row.to, row.cost, row.bidirectional)?;
    }

    layout.resolve_links()
}
