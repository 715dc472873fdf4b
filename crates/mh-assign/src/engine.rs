//! `AssignmentEngine` — the only writer of location occupancy.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use mh_core::{ItemId, Location, LocationId, LocationStatus};
use mh_events::EventKind;
use mh_store::FacilityStore;
use mh_topology::TopologyStore;

use crate::AssignResult;

pub struct AssignmentEngine {
    topology: Arc<TopologyStore>,
    store:    Arc<dyn FacilityStore>,
}

impl AssignmentEngine {
    pub fn new(topology: Arc<TopologyStore>, store: Arc<dyn FacilityStore>) -> Self {
        Self { topology, store }
    }

    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    /// Place `item` on `location`.
    ///
    /// `Ok(false)` if the location is unknown, occupied, or out of service.
    /// A reservation is consumed by the assignment.
    pub async fn try_assign_item(&self, location: &LocationId, item: ItemId) -> AssignResult<bool> {
        self.mutate(location, |current| {
            if current.is_occupied() || current.status == LocationStatus::OutOfService {
                return None;
            }
            Some(current.clone().holding(item))
        })
        .await
    }

    /// Empty `location`.  `Ok(false)` if unknown or already empty.
    pub async fn try_clear_item(&self, location: &LocationId) -> AssignResult<bool> {
        self.mutate(location, |current| current.is_occupied().then(|| emptied(current))).await
    }

    /// Empty `location` only if it currently holds `item`.
    pub async fn try_clear_specific(&self, location: &LocationId, item: &ItemId) -> AssignResult<bool> {
        self.mutate(location, |current| {
            (current.current_item.as_ref() == Some(item)).then(|| emptied(current))
        })
        .await
    }

    /// Hold an available location for an incoming item.
    pub async fn try_reserve(&self, location: &LocationId) -> AssignResult<bool> {
        self.set_status_if(location, LocationStatus::Available, LocationStatus::Reserved).await
    }

    pub async fn release_reservation(&self, location: &LocationId) -> AssignResult<bool> {
        self.set_status_if(location, LocationStatus::Reserved, LocationStatus::Available).await
    }

    /// Take an empty location out of service, or return it to service.
    ///
    /// An occupied location cannot be taken out of service.  Returning to
    /// service yields `Available`.
    pub async fn set_out_of_service(&self, location: &LocationId, out_of_service: bool) -> AssignResult<bool> {
        self.mutate(location, |current| {
            let next = match (out_of_service, current.status) {
                (true, LocationStatus::Available | LocationStatus::Reserved) => LocationStatus::OutOfService,
                (false, LocationStatus::OutOfService)                        => LocationStatus::Available,
                _ => return None,
            };
            let mut updated = current.clone();
            updated.status = next;
            Some(updated)
        })
        .await
    }

    /// Move `item` from `from` to `to`.
    ///
    /// The destination is claimed first; `Ok(false)` if `from` does not hold
    /// `item` or `to` cannot take it.  If clearing the source then fails, the
    /// destination claim is rolled back before the error is returned.
    pub async fn transfer(&self, from: &LocationId, to: &LocationId, item: &ItemId) -> AssignResult<bool> {
        let holds = self
            .topology
            .get_location(from)
            .is_ok_and(|l| l.current_item.as_ref() == Some(item));
        if !holds || from == to {
            return Ok(false);
        }
        if !self.try_assign_item(to, item.clone()).await? {
            return Ok(false);
        }
        match self.try_clear_specific(from, item).await {
            Ok(_) => Ok(true),
            Err(e) => {
                if let Err(rollback) = self.try_clear_specific(to, item).await {
                    warn!(location = %to, error = %rollback, "transfer rollback failed");
                }
                Err(e)
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────

    async fn set_status_if(
        &self,
        location: &LocationId,
        expected: LocationStatus,
        next:     LocationStatus,
    ) -> AssignResult<bool> {
        self.mutate(location, |current| {
            (current.status == expected).then(|| {
                let mut updated = current.clone();
                updated.status = next;
                updated
            })
        })
        .await
    }

    /// Run one gated read-check-persist-commit step.
    ///
    /// `decide` sees the committed record and returns the replacement, or
    /// `None` to leave it untouched.
    async fn mutate(
        &self,
        location: &LocationId,
        decide:   impl FnOnce(&Location) -> Option<Location>,
    ) -> AssignResult<bool> {
        let Some(cell) = self.topology.cell(location) else {
            return Ok(false);
        };
        let mut guard = cell.lock().await;
        let current = guard.current();
        let Some(next) = decide(&current) else {
            return Ok(false);
        };
        debug_assert!(next.is_consistent());

        if let Err(e) = self.store.put_location(&next).await {
            warn!(location = %location, error = %e, "location write failed; state unchanged");
            return Err(e.into());
        }
        let (old, new) = (state_of(&current), state_of(&next));
        guard.commit(next);
        self.topology
            .events()
            .emit(EventKind::LocationStateChanged, location.as_str(), old, new);
        debug!(location = %location, "location state committed");
        Ok(true)
    }
}

fn emptied(current: &Location) -> Location {
    let mut updated = current.clone();
    updated.current_item = None;
    updated.status = LocationStatus::Available;
    updated
}

fn state_of(location: &Location) -> Value {
    json!({ "status": location.status, "current_item": location.current_item })
}
