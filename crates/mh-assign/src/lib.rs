//! `mh-assign` — the assignment engine.
//!
//! # Crate layout
//!
//! | Module     | Contents                                                     |
//! |------------|--------------------------------------------------------------|
//! | [`engine`] | `AssignmentEngine`: assign, clear, reserve, out-of-service, transfer |
//! | [`error`]  | `AssignError`, `AssignResult<T>`                             |
//!
//! Every operation is a read-check-persist-commit sequence on one location,
//! run while holding that location's gate.  Two calls on the same location
//! are therefore linearizable; calls on different locations never wait for
//! each other.
//!
//! Results follow one convention throughout: `Ok(false)` means a
//! precondition did not hold and nothing changed, `Err` means the
//! persistence collaborator failed and nothing changed.

pub mod engine;
pub mod error;


pub use engine::AssignmentEngine;
pub use error::{AssignError, AssignResult};
