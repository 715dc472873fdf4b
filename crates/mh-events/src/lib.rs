//! `mh-events` — translates internal mutations into observable notifications.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                  |
//! |---------------|-----------------------------------------------------------|
//! | [`event`]     | `StateEvent`, `EventKind` (topic names)                   |
//! | [`relay`]     | `EventRelay` — synchronous emit, broadcast fan-out, publisher pump |
//! | [`publisher`] | `Publisher` trait, `NoopPublisher`, `TracingPublisher`, `MemoryPublisher` |
//! | [`error`]     | `EventError`, `EventResult<T>`                            |
//!
//! # Delivery model
//!
//! ```text
//! mutation ──emit()──► broadcast ring ──► in-process subscribers
//!                                   └───► publisher pump ──► Publisher::publish(topic, payload)
//! ```
//!
//! `emit` is synchronous and never fails: the event exists once `emit`
//! returns.  Delivery beyond that point is fire-and-forget; a slow or failing
//! publisher loses events (logged) but never blocks the mutating caller.

pub mod error;
pub mod event;
pub mod publisher;
pub mod relay;

#[cfg(test)]
mod tests;

pub use error::{EventError, EventResult};
pub use event::{EventKind, StateEvent, json_value};
pub use publisher::{MemoryPublisher, NoopPublisher, Publisher, TracingPublisher};
pub use relay::EventRelay;
