//! Transport error type.

use thiserror::Error;

use mh_core::{ItemId, ItemKind};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("carrier {0} already exists")]
    DuplicateId(ItemId),

    #[error("carrier {0} not found")]
    NotFound(ItemId),

    /// A child was attached to a parent of the wrong level.
    #[error("carrier {item} is a {found}, expected a {expected}")]
    KindMismatch { item: ItemId, expected: ItemKind, found: ItemKind },

    /// Cassettes are roots; trays and memory units always have a parent.
    #[error("carrier {item}: {reason}")]
    Hierarchy { item: ItemId, reason: String },

    /// A top-level carrier has no location of its own.
    #[error("carrier {0} has no location")]
    Unplaced(ItemId),
}

pub type TransportResult<T> = Result<T, TransportError>;
