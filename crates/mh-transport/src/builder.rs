//! Fluent builder for a provisioned [`TransportDirectory`].
//!
//! ```rust
//! use mh_events::EventRelay;
//! use mh_transport::TransportDirectoryBuilder;
//!
//! let dir = TransportDirectoryBuilder::new()
//!     .cassette("c1", "stk-1")
//!     .tray("c1.t1", "c1")
//!     .memory("c1.t1.m1", "c1.t1")
//!     .build(EventRelay::new(16))
//!     .unwrap();
//!
//! assert_eq!(dir.location_of(&"c1.t1.m1".into()).unwrap().as_str(), "stk-1");
//! ```

use mh_core::{Carrier, ItemKind};
use mh_events::EventRelay;

use crate::{TransportDirectory, TransportResult};

#[derive(Default)]
pub struct TransportDirectoryBuilder {
    carriers: Vec<Carrier>,
}

impl TransportDirectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cassette(mut self, id: &str, location: &str) -> Self {
        self.carriers.push(Carrier::cassette(id, location));
        self
    }

    pub fn tray(mut self, id: &str, cassette: &str) -> Self {
        self.carriers.push(Carrier::stowed(id, ItemKind::Tray, cassette));
        self
    }

    pub fn memory(mut self, id: &str, tray: &str) -> Self {
        self.carriers.push(Carrier::stowed(id, ItemKind::Memory, tray));
        self
    }

    /// Add pre-built records (e.g. loaded from the persistence store).
    pub fn carriers(mut self, carriers: impl IntoIterator<Item = Carrier>) -> Self {
        self.carriers.extend(carriers);
        self
    }

    /// Validate the hierarchy and construct the directory.
    pub fn build(self, events: EventRelay) -> TransportResult<TransportDirectory> {
        TransportDirectory::from_carriers(self.carriers, events)
    }
}
