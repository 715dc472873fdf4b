//! `mh-motion` — robot motion simulation.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                  |
//! |---------------|-----------------------------------------------------------|
//! | [`state`]     | `RobotMotionState`, the per-tick step rule, `MoveOutcome`, `MoveTicket` |
//! | [`simulator`] | `MotionSimulator`: schedule/cancel moves, `tick`, `run`   |
//! | [`error`]     | `MotionError`, `MotionResult<T>`                          |
//!
//! # Movement model
//!
//! Robots travel in straight lines at constant speed in the x/y plane; `z`
//! never changes.  Every tick of length `Δt`, each robot with an outstanding
//! move either snaps onto its target (when it is within one step plus the
//! arrival epsilon) or advances one step of `speed · Δt` toward it.  The
//! persisted robot record is the position of record: each tick reads it,
//! computes, and writes it back.

pub mod error;
pub mod simulator;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::{MotionError, MotionResult};
pub use simulator::{MotionSimulator, TickSummary};
pub use state::{MoveOutcome, MoveTicket, RobotMotionState, Step};
