//! Error types for mh-store.

use thiserror::Error;

/// Infrastructure faults raised by a store back-end.
///
/// A missing record is not an error: `get_*` returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;
