//! Client side of the manager's HTTP API.
//!
//! * [`ManagerClient`] issues the REST commands (list, create, start, stop, ...)
//! * [`Multiplexer`] shares one `/events` stream between any number of
//!   per-server listeners and reconnects when the stream drops
//! * [`sse`] holds the `text/event-stream` parser both rely on

pub mod multiplexer;
mod rest;
pub mod sse;

pub use multiplexer::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_RECONNECT_DELAY, ErrorCallback, EventCallback, Multiplexer,
    MultiplexerOptions, ReconnectCallback, Subscription,
};
pub use rest::ManagerClient;
