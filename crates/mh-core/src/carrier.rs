//! Carrier records: the cassette → tray → memory containment tree.
//!
//! Carriers live in an arena keyed by [`ItemId`]; containment is expressed
//! as id lists (`parent`, `children`), never live references.

use crate::{ItemId, LocationId};

/// Level in the containment hierarchy.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Cassette,
    Tray,
    Memory,
}

impl ItemKind {
    /// The kind this kind may contain, if any.
    pub fn child_kind(self) -> Option<ItemKind> {
        match self {
            ItemKind::Cassette => Some(ItemKind::Tray),
            ItemKind::Tray     => Some(ItemKind::Memory),
            ItemKind::Memory   => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Cassette => "cassette",
            ItemKind::Tray     => "tray",
            ItemKind::Memory   => "memory",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One carrier in the arena.
///
/// `location` is set when the item sits at a location in its own right
/// (a cassette on a port, a tray on a tray port).  `None` means the item is
/// stowed inside `parent` and shares its parent's effective location.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Carrier {
    pub id:       ItemId,
    pub kind:     ItemKind,
    pub parent:   Option<ItemId>,
    #[serde(default)]
    pub children: Vec<ItemId>,
    pub location: Option<LocationId>,
}

impl Carrier {
    /// A top-level cassette resting at `location`.
    pub fn cassette(id: impl Into<ItemId>, location: impl Into<LocationId>) -> Self {
        Self {
            id:       id.into(),
            kind:     ItemKind::Cassette,
            parent:   None,
            children: Vec::new(),
            location: Some(location.into()),
        }
    }

    /// A child carrier stowed inside `parent`.
    pub fn stowed(id: impl Into<ItemId>, kind: ItemKind, parent: impl Into<ItemId>) -> Self {
        Self {
            id:       id.into(),
            kind,
            parent:   Some(parent.into()),
            children: Vec::new(),
            location: None,
        }
    }
}
