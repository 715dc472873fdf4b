//! `TransportDirectory` — the carrier arena.
//!
//! Carriers are stored by id in one `HashMap`; parent/child links are id
//! lists, so the tree can be walked without holding references into the
//! map.  The map sits behind a `parking_lot::RwLock` that is never held
//! across an await.
//!
//! # Effective location
//!
//! A carrier with `location = Some(_)` sits there in its own right.  A
//! carrier with `location = None` is stowed inside its parent and shares the
//! parent's effective location, so moving a cassette moves every tray and
//! memory unit inside it with a single write.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::debug;

use mh_core::{Carrier, ItemId, ItemKind, LocationId};
use mh_events::{EventKind, EventRelay, json_value};

use crate::{TransportError, TransportResult};

pub struct TransportDirectory {
    items:  RwLock<HashMap<ItemId, Carrier>>,
    events: EventRelay,
}

impl TransportDirectory {
    pub fn new(events: EventRelay) -> Self {
        Self { items: RwLock::new(HashMap::new()), events }
    }

    /// Bulk provisioning from stored or hand-built records.  No events.
    ///
    /// Records may arrive in any order; parents are installed before their
    /// children.  Existing `children` lists are kept and completed from the
    /// children's `parent` links.
    pub fn from_carriers(mut carriers: Vec<Carrier>, events: EventRelay) -> TransportResult<Self> {
        carriers.sort_by_key(|c| depth(c.kind));
        let mut items = HashMap::with_capacity(carriers.len());
        for carrier in carriers {
            insert_into(&mut items, carrier)?;
        }
        debug!(carriers = items.len(), "transport directory provisioned");
        Ok(Self { items: RwLock::new(items), events })
    }

    // ── Provisioning ──────────────────────────────────────────────────────

    /// Register a carrier and link it into its parent's child list.
    pub fn insert(&self, carrier: Carrier) -> TransportResult<()> {
        let id = carrier.id.clone();
        let payload = json_value(&carrier);
        insert_into(&mut self.items.write(), carrier)?;
        self.events.emit(EventKind::CarrierAdded, id.as_str(), Value::Null, payload);
        Ok(())
    }

    pub fn add_cassette(&self, id: impl Into<ItemId>, location: impl Into<LocationId>) -> TransportResult<()> {
        self.insert(Carrier::cassette(id, location))
    }

    pub fn add_tray(&self, id: impl Into<ItemId>, cassette: impl Into<ItemId>) -> TransportResult<()> {
        self.insert(Carrier::stowed(id, ItemKind::Tray, cassette))
    }

    pub fn add_memory(&self, id: impl Into<ItemId>, tray: impl Into<ItemId>) -> TransportResult<()> {
        self.insert(Carrier::stowed(id, ItemKind::Memory, tray))
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn get(&self, id: &ItemId) -> TransportResult<Carrier> {
        self.items
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn kind_of(&self, id: &ItemId) -> TransportResult<ItemKind> {
        self.get(id).map(|c| c.kind)
    }

    pub fn parent(&self, id: &ItemId) -> TransportResult<Option<ItemId>> {
        self.get(id).map(|c| c.parent)
    }

    /// Direct children in order.
    pub fn children(&self, id: &ItemId) -> TransportResult<Vec<ItemId>> {
        self.get(id).map(|c| c.children)
    }

    /// Every carrier below `id`, depth-first in child order.
    pub fn descendants(&self, id: &ItemId) -> TransportResult<Vec<ItemId>> {
        let items = self.items.read();
        let root = items.get(id).ok_or_else(|| TransportError::NotFound(id.clone()))?;
        let mut out = Vec::new();
        let mut stack: Vec<&ItemId> = root.children.iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next.clone());
            if let Some(c) = items.get(next) {
                stack.extend(c.children.iter().rev());
            }
        }
        Ok(out)
    }

    /// The location `id` effectively resides at.
    pub fn location_of(&self, id: &ItemId) -> TransportResult<LocationId> {
        effective_location(&self.items.read(), id)
    }

    /// Copies of every carrier, ordered by id.
    pub fn carriers(&self) -> Vec<Carrier> {
        let mut all: Vec<Carrier> = self.items.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    // ── Movement ──────────────────────────────────────────────────────────

    /// Record that `id` now sits at `location` in its own right.
    ///
    /// Its contents follow implicitly.  Emits one `CarrierRelocated` event
    /// carrying the previous effective location (null if it had none).
    /// Returns the updated record for persisting.
    pub fn relocate(&self, id: &ItemId, location: LocationId) -> TransportResult<Carrier> {
        let (old, record) = {
            let mut items = self.items.write();
            let old = effective_location(&items, id).ok();
            let carrier = items.get_mut(id).ok_or_else(|| TransportError::NotFound(id.clone()))?;
            carrier.location = Some(location.clone());
            (old, carrier.clone())
        };
        debug!(item = %id, from = ?old, to = %location, "carrier relocated");
        self.events.emit(
            EventKind::CarrierRelocated,
            id.as_str(),
            json!({ "location": old }),
            json!({ "location": location }),
        );
        Ok(record)
    }

    /// Return a tray or memory unit to its parent; it then follows the
    /// parent's effective location again.  Returns the updated record.
    pub fn stow(&self, id: &ItemId) -> TransportResult<Carrier> {
        let (old, new, record) = {
            let mut items = self.items.write();
            let old = effective_location(&items, id).ok();
            let carrier = items.get_mut(id).ok_or_else(|| TransportError::NotFound(id.clone()))?;
            if carrier.parent.is_none() {
                return Err(TransportError::Hierarchy {
                    item:   id.clone(),
                    reason: "a cassette cannot be stowed".into(),
                });
            }
            carrier.location = None;
            let record = carrier.clone();
            (old, effective_location(&items, id).ok(), record)
        };
        self.events.emit(
            EventKind::CarrierRelocated,
            id.as_str(),
            json!({ "location": old }),
            json!({ "location": new }),
        );
        Ok(record)
    }

    pub fn events(&self) -> &EventRelay {
        &self.events
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn depth(kind: ItemKind) -> u8 {
    match kind {
        ItemKind::Cassette => 0,
        ItemKind::Tray     => 1,
        ItemKind::Memory   => 2,
    }
}

/// Required parent kind for `kind`; `None` for roots.
fn parent_kind(kind: ItemKind) -> Option<ItemKind> {
    match kind {
        ItemKind::Cassette => None,
        ItemKind::Tray     => Some(ItemKind::Cassette),
        ItemKind::Memory   => Some(ItemKind::Tray),
    }
}

fn insert_into(items: &mut HashMap<ItemId, Carrier>, carrier: Carrier) -> TransportResult<()> {
    if items.contains_key(&carrier.id) {
        return Err(TransportError::DuplicateId(carrier.id));
    }
    match (parent_kind(carrier.kind), &carrier.parent) {
        (None, None) => {
            if carrier.location.is_none() {
                return Err(TransportError::Unplaced(carrier.id));
            }
        }
        (None, Some(_)) => {
            return Err(TransportError::Hierarchy {
                item:   carrier.id,
                reason: "a cassette has no parent".into(),
            });
        }
        (Some(_), None) => {
            return Err(TransportError::Hierarchy {
                item:   carrier.id,
                reason: format!("a {} needs a parent", carrier.kind),
            });
        }
        (Some(expected), Some(parent_id)) => {
            let parent = items
                .get_mut(parent_id)
                .ok_or_else(|| TransportError::NotFound(parent_id.clone()))?;
            if parent.kind != expected {
                return Err(TransportError::KindMismatch {
                    item: parent_id.clone(),
                    expected,
                    found: parent.kind,
                });
            }
            if !parent.children.contains(&carrier.id) {
                parent.children.push(carrier.id.clone());
            }
        }
    }
    items.insert(carrier.id.clone(), carrier);
    Ok(())
}

fn effective_location(items: &HashMap<ItemId, Carrier>, id: &ItemId) -> TransportResult<LocationId> {
    let mut current = items.get(id).ok_or_else(|| TransportError::NotFound(id.clone()))?;
    loop {
        if let Some(location) = &current.location {
            return Ok(location.clone());
        }
        let Some(parent) = &current.parent else {
            return Err(TransportError::Unplaced(current.id.clone()));
        };
        current = items.get(parent).ok_or_else(|| TransportError::NotFound(parent.clone()))?;
    }
}
