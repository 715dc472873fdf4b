//! `mh-facility` — the facility registry and its runtime.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                   |
//! |--------------|------------------------------------------------------------|
//! | [`builder`]  | `FacilityBuilder`, `DispatchMode`                          |
//! | [`facility`] | `Facility` (registry, intake, queries), `FacilityHandle`   |
//! | [`dispatch`] | `Dispatcher` trait, `JobOrder`, `JobReport`, `ReportSink`, `PublishingDispatcher` |
//! | [`robots`]   | `RobotDispatcher`: jobs executed by simulated robots       |
//! | `driver`     | per-lot driver tasks (internal)                            |
//! | [`error`]    | `FacilityError`, `FacilityResult<T>`                       |
//!
//! # Runtime
//!
//! ```text
//!  submit_work_order ─► PlanEngine lot ─► lot driver ─► Dispatcher ─► executor
//!                                             ▲                          │
//!                                             └──── JobReport (sink) ◄───┘
//!
//!  motion tick loop ──► store + EventRelay ──► publisher pump ──► Publisher
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use mh_facility::FacilityBuilder;
//!
//! let facility = FacilityBuilder::new(config, store, layout)
//!     .robots(robots)
//!     .carriers(carriers)
//!     .build()?;
//! let handle = facility.start(CancellationToken::new()).await?;
//! let lot = facility.submit_work_order(order).await?;
//! facility.wait_for_lot(&lot).await;
//! handle.shutdown().await;
//! ```

pub mod builder;
pub mod dispatch;
mod driver;
pub mod error;
pub mod facility;
pub mod robots;

#[cfg(test)]
mod tests;

pub use builder::{DispatchMode, FacilityBuilder};
pub use dispatch::{Dispatcher, JobOrder, JobReport, PublishingDispatcher, ReportSink};
pub use error::{FacilityError, FacilityResult};
pub use facility::{Facility, FacilityHandle};
pub use robots::RobotDispatcher;
