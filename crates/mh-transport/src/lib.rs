//! `mh-transport` — the carrier containment model.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                   |
//! |---------------|------------------------------------------------------------|
//! | [`directory`] | `TransportDirectory`: id-keyed carrier arena, effective locations, relocation |
//! | [`builder`]   | `TransportDirectoryBuilder` (fluent provisioning)          |
//! | [`error`]     | `TransportError`, `TransportResult<T>`                     |
//!
//! Cassettes own ordered trays; trays own ordered memory units.  Every
//! relation is an id list inside the arena, so a carrier can be looked up,
//! moved or serialized without touching its relatives.

pub mod builder;
pub mod directory;
pub mod error;


pub use builder::TransportDirectoryBuilder;
pub use directory::TransportDirectory;
pub use error::{TransportError, TransportResult};
