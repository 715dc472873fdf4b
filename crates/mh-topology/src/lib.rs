//! `mh-topology` — locations, the location graph, and layout loading.
//!
//! # Crate layout
//!
//! | Module     | Contents                                                      |
//! |------------|---------------------------------------------------------------|
//! | [`graph`]  | `LocationGraph`, `Edge` — add-only routable graph             |
//! | [`store`]  | `TopologyStore` (location index + graph + R-tree), `LocationCell` |
//! | [`layout`] | `FacilityLayout`, `load_layout_csv`, `load_layout_readers`    |
//! | [`router`] | `Router` trait, `Route`, `DijkstraRouter` (feature = `"routing"`) |
//! | [`error`]  | `TopologyError`, `TopologyResult<T>`                          |
//!
//! # Feature flags
//!
//! | Flag      | Effect                                                     |
//! |-----------|------------------------------------------------------------|
//! | `routing` | Adds shortest-path search as a separate layer.             |
//!
//! The core graph deliberately offers only `neighbors`; choosing a route is
//! the caller's business.

pub mod error;
pub mod graph;
pub mod layout;
pub mod store;

#[cfg(feature = "routing")]
pub mod router;


pub use error::{TopologyError, TopologyResult};
pub use graph::{Edge, LocationGraph};
pub use layout::{FacilityLayout, load_layout_csv, load_layout_readers};
pub use store::{LocationCell, LocationGuard, TopologyStore};

#[cfg(feature = "routing")]
pub use router::{DijkstraRouter, Route, Router};
