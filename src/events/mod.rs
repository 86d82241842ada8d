//! Server events and the bus that distributes them.
//!
//! The supervisor publishes a [`ServerEvent`] for every state change, console
//! line and metric update. The [`EventBus`] fans each event out to all
//! attached [`EventSubscriber`]s; filtering by server happens at the consumer.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventSubscriber};
pub use types::{EventKind, LogLine, LogStream, ServerEvent, WireEvent};
