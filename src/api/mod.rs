//! HTTP and Server-Sent Events API built on Actix Web.
//!
//! Exposes the supervisor's commands as REST routes and the event bus as a
//! live SSE stream on `/events`:
//! - `GET /servers`, `POST /servers`, `GET|DELETE /servers/{id}`
//! - `POST /servers/{id}/start|stop|restart`, `POST /servers/{id}/cmd`
//! - `GET /servers/{id}/logs` for the recent console output
//! - `GET /health`

pub use self::actix_error::ApiError;
pub use self::handlers::{ApiState, configure};
pub use self::server::{ApiHandle, HttpApi};
pub use self::types::{CommandRequest, CreateServerRequest, StopQuery};

pub mod actix_error;
pub mod events;
pub mod handlers;
pub mod server;
pub mod types;
