//! `mh-core` — foundational types for the `rust_mh` material-handling framework.
//!
//! This crate is a dependency of every other `mh-*` crate.  It has no `mh-*`
//! dependencies and only two external ones (`thiserror` and `serde`).
//!
//! # What lives here
//!
//! | Module         | Contents                                                  |
//! |----------------|-----------------------------------------------------------|
//! | [`ids`]        | `LocationId`, `ItemId`, `RobotId`, `LotId`, `PlanGroupId`, `PlanId`, `JobId`, `IdSequence` |
//! | [`geo`]        | `Position`, planar distance helpers                       |
//! | [`location`]   | `Location`, `LocationKind`, `LocationStatus`              |
//! | [`carrier`]    | `Carrier`, `ItemKind` (cassette / tray / memory)          |
//! | [`robot`]      | `Robot` record                                            |
//! | [`snapshot`]   | `GraphSnapshot`, `EdgeRecord`                             |
//! | [`config`]     | `FacilityConfig`                                          |
//! | [`error`]      | `CoreError`, `CoreResult`                                 |
//!
//! Every public record derives `Serialize`/`Deserialize`: these are the
//! shapes handed to the persistence collaborator.

pub mod carrier;
pub mod config;
pub mod error;
pub mod geo;
pub mod ids;
pub mod location;
pub mod robot;
pub mod snapshot;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use carrier::{Carrier, ItemKind};
pub use config::FacilityConfig;
pub use error::{CoreError, CoreResult};
pub use geo::Position;
pub use ids::{IdSequence, ItemId, JobId, LocationId, LotId, PlanGroupId, PlanId, RobotId};
pub use location::{Location, LocationKind, LocationStatus};
pub use robot::Robot;
pub use snapshot::{EdgeRecord, GraphSnapshot};
