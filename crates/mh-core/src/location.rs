//! Location records: typed storage points that hold at most one item.

use std::str::FromStr;

use crate::{CoreError, ItemId, LocationId, Position};

/// What sort of point a location is.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Load port accepting a whole cassette.
    CassettePort,
    /// Port accepting a single tray.
    TrayPort,
    /// Pick-and-place position for a memory unit.
    MemoryPort,
    /// Floor marker used as a waypoint; can still hold an item.
    Marker,
    /// Slot inside a carrier (e.g. a tray position in a cassette).
    CarrierSlot,
    /// A robot's deck.  Items in transit live here.
    Robot,
}

impl LocationKind {
    /// Label used in CSV layouts and event payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::CassettePort => "cassette_port",
            LocationKind::TrayPort     => "tray_port",
            LocationKind::MemoryPort   => "memory_port",
            LocationKind::Marker       => "marker",
            LocationKind::CarrierSlot  => "carrier_slot",
            LocationKind::Robot        => "robot",
        }
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cassette_port" => Ok(LocationKind::CassettePort),
            "tray_port"     => Ok(LocationKind::TrayPort),
            "memory_port"   => Ok(LocationKind::MemoryPort),
            "marker"        => Ok(LocationKind::Marker),
            "carrier_slot"  => Ok(LocationKind::CarrierSlot),
            "robot"         => Ok(LocationKind::Robot),
            other => Err(CoreError::Parse(format!("unknown location kind {other:?}"))),
        }
    }
}

/// Occupancy status.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    #[default]
    Available,
    Occupied,
    /// Held for an incoming item; still empty.
    Reserved,
    OutOfService,
}

impl LocationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationStatus::Available    => "available",
            LocationStatus::Occupied     => "occupied",
            LocationStatus::Reserved     => "reserved",
            LocationStatus::OutOfService => "out_of_service",
        }
    }
}

impl std::fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, addressable point holding at most one transportable item.
///
/// `parent` and `children` are non-owning id links forming the spatial
/// hierarchy (a cassette port and its carrier slots, for instance).
///
/// Invariant: `status == Occupied` iff `current_item.is_some()`.  Only the
/// assignment engine mutates `status` and `current_item` after provisioning.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub id:           LocationId,
    pub name:         String,
    pub kind:         LocationKind,
    pub status:       LocationStatus,
    pub current_item: Option<ItemId>,
    pub position:     Position,
    pub parent:       Option<LocationId>,
    #[serde(default)]
    pub children:     Vec<LocationId>,
}

impl Location {
    /// An empty, available location with no hierarchy links.
    pub fn new(id: impl Into<LocationId>, name: impl Into<String>, kind: LocationKind, position: Position) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            status: LocationStatus::Available,
            current_item: None,
            position,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Builder-style: place `item` here at provisioning time.
    pub fn holding(mut self, item: impl Into<ItemId>) -> Self {
        self.current_item = Some(item.into());
        self.status = LocationStatus::Occupied;
        self
    }

    /// Builder-style: link to a parent location.
    pub fn with_parent(mut self, parent: impl Into<LocationId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.current_item.is_some()
    }

    /// `true` when the Occupied⇔item invariant holds.
    #[inline]
    pub fn is_consistent(&self) -> bool {
        (self.status == LocationStatus::Occupied) == self.current_item.is_some()
    }
}
