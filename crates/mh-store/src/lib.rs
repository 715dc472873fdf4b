//! `mh-store` — the persistence collaborator.
//!
//! # Crate layout
//!
//! | Module     | Contents                                                     |
//! |------------|--------------------------------------------------------------|
//! | [`store`]  | `FacilityStore` trait                                        |
//! | [`memory`] | `MemoryStore` — in-process maps with fault injection         |
//! | [`sqlite`] | `SqliteStore` (feature = `"sqlite"` only)                    |
//! | [`error`]  | `StoreError`, `StoreResult<T>`                               |
//!
//! # Feature flags
//!
//! | Flag     | Effect                                                      |
//! |----------|-------------------------------------------------------------|
//! | `sqlite` | Enables the SQLite back-end via `rusqlite`.                 |
//!
//! The store offers get/put/list keyed by string id for locations, carrier
//! items, robots, and the graph snapshot.  There are no cross-entity
//! transactions; callers that need atomicity across records serialize
//! through their own per-entity gates.

pub mod error;
pub mod memory;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::FacilityStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
