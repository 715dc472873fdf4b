//! In-memory store with fault injection.
//!
//! Records are kept in `BTreeMap`s so `list_*` is ordered by id.  Faults can
//! be injected globally ([`MemoryStore::set_unavailable`]) or per record key
//! ([`MemoryStore::inject_fault`], keys look like `"robot/r1"`), which lets
//! tests exercise the skip-and-retry paths of the runtime loops.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use mh_core::{Carrier, GraphSnapshot, ItemId, Location, LocationId, Robot, RobotId};

use crate::{FacilityStore, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    locations:   RwLock<BTreeMap<LocationId, Location>>,
    items:       RwLock<BTreeMap<ItemId, Carrier>>,
    robots:      RwLock<BTreeMap<RobotId, Robot>>,
    graph:       RwLock<Option<GraphSnapshot>>,
    unavailable: RwLock<bool>,
    faults:      RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    /// Make reads and writes of one record fail (`"location/p1"`,
    /// `"item/c1"`, `"robot/r1"`, `"graph"`).
    pub fn inject_fault(&self, key: impl Into<String>) {
        self.faults.write().insert(key.into());
    }

    pub fn clear_fault(&self, key: &str) {
        self.faults.write().remove(key);
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        if *self.unavailable.read() {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        if self.faults.read().contains(key) {
            return Err(StoreError::Unavailable(format!("injected fault on {key}")));
        }
        Ok(())
    }

    fn check_all(&self) -> StoreResult<()> {
        if *self.unavailable.read() {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl FacilityStore for MemoryStore {
    async fn get_location(&self, id: &LocationId) -> StoreResult<Option<Location>> {
        self.check(&format!("location/{id}"))?;
        Ok(self.locations.read().get(id).cloned())
    }

    async fn put_location(&self, location: &Location) -> StoreResult<()> {
        self.check(&format!("location/{}", location.id))?;
        self.locations.write().insert(location.id.clone(), location.clone());
        Ok(())
    }

    async fn list_locations(&self) -> StoreResult<Vec<Location>> {
        self.check_all()?;
        Ok(self.locations.read().values().cloned().collect())
    }

    async fn get_item(&self, id: &ItemId) -> StoreResult<Option<Carrier>> {
        self.check(&format!("item/{id}"))?;
        Ok(self.items.read().get(id).cloned())
    }

    async fn put_item(&self, item: &Carrier) -> StoreResult<()> {
        self.check(&format!("item/{}", item.id))?;
        self.items.write().insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn list_items(&self) -> StoreResult<Vec<Carrier>> {
        self.check_all()?;
        Ok(self.items.read().values().cloned().collect())
    }

    async fn get_robot(&self, id: &RobotId) -> StoreResult<Option<Robot>> {
        self.check(&format!("robot/{id}"))?;
        Ok(self.robots.read().get(id).cloned())
    }

    async fn put_robot(&self, robot: &Robot) -> StoreResult<()> {
        self.check(&format!("robot/{}", robot.id))?;
        self.robots.write().insert(robot.id.clone(), robot.clone());
        Ok(())
    }

    async fn list_robots(&self) -> StoreResult<Vec<Robot>> {
        self.check_all()?;
        Ok(self.robots.read().values().cloned().collect())
    }

    async fn get_graph(&self) -> StoreResult<Option<GraphSnapshot>> {
        self.check("graph")?;
        Ok(self.graph.read().clone())
    }

    async fn put_graph(&self, graph: &GraphSnapshot) -> StoreResult<()> {
        self.check("graph")?;
        *self.graph.write() = Some(graph.clone());
        Ok(())
    }
}
