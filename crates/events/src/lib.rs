//! In-process job lifecycle events.
//!
//! - [`EventBus`] fans [`JobEvent`]s out over a `tokio::sync::broadcast`
//!   channel so background batch and chain work stays observable.
//! - [`EventLogger`] is a subscriber that writes every event to `tracing`.

pub mod bus;
pub mod logger;

pub use bus::{event_types, EventBus, JobEvent};
pub use logger::EventLogger;
