//! Framework error type.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant via `#[from]` where a core parse or validation can fail.

use thiserror::Error;

/// The top-level error type for `mh-core` and a common base for sub-crates.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid dimension {what}: {value} (must be positive and finite)")]
    InvalidDimension { what: &'static str, value: f64 },
}

/// Shorthand result type for `mh-core`.
pub type CoreResult<T> = Result<T, CoreError>;
