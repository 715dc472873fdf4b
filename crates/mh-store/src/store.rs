//! The `FacilityStore` trait implemented by every persistence back-end.

use async_trait::async_trait;

use mh_core::{Carrier, GraphSnapshot, ItemId, Location, LocationId, Robot, RobotId};

use crate::StoreResult;

/// Key/value persistence for facility records.
///
/// All methods may suspend; they are the only await points besides event
/// publishing in the runtime loops.  `put_*` overwrites unconditionally.
#[async_trait]
pub trait FacilityStore: Send + Sync + 'static {
    async fn get_location(&self, id: &LocationId) -> StoreResult<Option<Location>>;
    async fn put_location(&self, location: &Location) -> StoreResult<()>;
    async fn list_locations(&self) -> StoreResult<Vec<Location>>;

    async fn get_item(&self, id: &ItemId) -> StoreResult<Option<Carrier>>;
    async fn put_item(&self, item: &Carrier) -> StoreResult<()>;
    async fn list_items(&self) -> StoreResult<Vec<Carrier>>;

    async fn get_robot(&self, id: &RobotId) -> StoreResult<Option<Robot>>;
    async fn put_robot(&self, robot: &Robot) -> StoreResult<()>;
    async fn list_robots(&self) -> StoreResult<Vec<Robot>>;

    async fn get_graph(&self) -> StoreResult<Option<GraphSnapshot>>;
    async fn put_graph(&self, graph: &GraphSnapshot) -> StoreResult<()>;
}
