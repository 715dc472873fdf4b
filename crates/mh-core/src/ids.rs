//! Strongly typed string identifiers.
//!
//! Every entity in the facility is addressed by an opaque string id (the
//! persistence collaborator keys all records by string).  Wrapping them in
//! distinct types keeps a `JobId` from ever being passed where a
//! `LocationId` is expected.  All ids serialize transparently as plain
//! strings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generate a typed string id wrapper.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name(String);

        impl $name {
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id! {
    /// A typed, addressable point in the facility (port, marker, slot, robot deck).
    pub struct LocationId;
}

typed_id! {
    /// A transportable carrier: cassette, tray, or memory unit.
    pub struct ItemId;
}

typed_id! {
    /// A mobile robot.
    pub struct RobotId;
}

typed_id! {
    pub struct LotId;
}

typed_id! {
    pub struct PlanGroupId;
}

typed_id! {
    pub struct PlanId;
}

typed_id! {
    pub struct JobId;
}

impl RobotId {
    /// Every robot also owns a `Robot`-kind location (its deck) under the
    /// same id string; items in transit are assigned there.
    pub fn deck(&self) -> LocationId {
        LocationId(self.0.clone())
    }
}

// ── IdSequence ────────────────────────────────────────────────────────────────

/// Monotonic, thread-safe generator of prefixed ids (`"job-000017"`).
///
/// Sequential ids keep log output and test expectations deterministic.
#[derive(Debug, Default)]
pub struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next raw counter value (starting at 1).
    #[inline]
    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocate the next id string with `prefix`.
    pub fn next_with(&self, prefix: &str) -> String {
        format!("{prefix}-{:06}", self.next_raw())
    }
}
