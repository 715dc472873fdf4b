//! `mh-plan` — work-order expansion and plan orchestration.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                    |
//! |--------------|-------------------------------------------------------------|
//! | [`model`]    | `WorkOrder`, `Lot`, `LotStep`, `PlanGroup`, `Plan`, `PlanStep`, `Job` and their statuses |
//! | [`strategy`] | `ExecutionStrategy` (`Sequential`, `Parallel`)              |
//! | [`expand`]   | step templates, `build_group`, `CarrierLookup`, `PlanIds`   |
//! | [`engine`]   | `PlanEngine` registry and group state machine, `Advance`    |
//! | [`loader`]   | `load_work_orders_csv`, `load_work_orders_reader`           |
//! | [`error`]    | `PlanError`, `PlanResult<T>`                                |
//!
//! # Hierarchy
//!
//! ```text
//! WorkOrder ─accept─► Lot ─schedule_step─► PlanGroup ─► Plan (one per cassette)
//!                                                        └─► PlanStep ─► Job
//! ```
//!
//! A group releases its plans through its strategy; a plan runs its steps
//! in order; a step is done once each of its jobs is Completed or Failed.

pub mod engine;
pub mod error;
pub mod expand;
pub mod loader;
pub mod model;
pub mod strategy;


pub use engine::{Advance, PlanEngine};
pub use error::{PlanError, PlanResult};
pub use expand::{CarrierLookup, PlanIds, build_group, build_plan, expand_step, step_template};
pub use loader::{load_work_orders_csv, load_work_orders_reader};
pub use model::{
    CassetteMove, FlowDirection, Job, JobStatus, Lot, LotStatus, LotStep, Plan, PlanGroup,
    PlanGroupStatus, PlanStatus, PlanStep, ProcessParams, StepAction, WorkOrder,
};
pub use strategy::ExecutionStrategy;
