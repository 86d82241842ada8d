//! Typed events published by the supervisor.
//!
//! On the wire every event is a JSON object
//! `{"type": "server.log", "serverId": "...", "data": {...}}`. Inside the
//! crate it is a [`ServerEvent`] carrying an [`EventKind`]; conversion between
//! the two happens in exactly one place so a new kind cannot be forgotten.

use crate::error::{Error, Result};
use crate::server::{ServerId, ServerInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which output stream a console line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line of console output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Stream tag
    pub stream: LogStream,
    /// Line text without the trailing newline
    pub line: String,
}

impl LogLine {
    /// Create a log line
    pub fn new(stream: LogStream, line: impl Into<String>) -> Self {
        Self {
            stream,
            line: line.into(),
        }
    }
}

/// Payload of a [`ServerEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// The server finished starting and is running
    Started(ServerInfo),
    /// The server stopped after a graceful stop request
    Stopped(ServerInfo),
    /// The server was killed on request
    Exited(ServerInfo),
    /// The server exited on its own or ignored a graceful stop
    Crashed(ServerInfo),
    /// A console line
    Log(LogLine),
    /// Fresh snapshot after a state or metric change
    Info(ServerInfo),
}

impl EventKind {
    /// Wire name of this kind
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started(_) => "server.started",
            Self::Stopped(_) => "server.stopped",
            Self::Exited(_) => "server.exited",
            Self::Crashed(_) => "server.crashed",
            Self::Log(_) => "server.log",
            Self::Info(_) => "server.info",
        }
    }

    /// Whether this kind marks the end of a process run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped(_) | Self::Exited(_) | Self::Crashed(_))
    }

    /// The server snapshot carried by this event, if any
    pub fn info(&self) -> Option<&ServerInfo> {
        match self {
            Self::Started(info)
            | Self::Stopped(info)
            | Self::Exited(info)
            | Self::Crashed(info)
            | Self::Info(info) => Some(info),
            Self::Log(_) => None,
        }
    }
}

/// An event about one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub struct ServerEvent {
    /// Server the event belongs to
    pub server_id: ServerId,
    /// What happened
    pub kind: EventKind,
}

impl ServerEvent {
    /// Create an event
    pub fn new(server_id: ServerId, kind: EventKind) -> Self {
        Self { server_id, kind }
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Serialize to the JSON payload written after `data:` on the stream
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse a JSON payload received from the stream
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Serialized form of a [`ServerEvent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event type, e.g. `server.log`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Server id
    #[serde(rename = "serverId")]
    pub server_id: ServerId,
    /// Kind-specific payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl From<ServerEvent> for WireEvent {
    fn from(event: ServerEvent) -> Self {
        let event_type = event.event_type().to_string();
        // Both payload types are plain structs of strings and numbers
        let data = match event.kind {
            EventKind::Log(line) => serde_json::to_value(line),
            EventKind::Started(info)
            | EventKind::Stopped(info)
            | EventKind::Exited(info)
            | EventKind::Crashed(info)
            | EventKind::Info(info) => serde_json::to_value(info),
        }
        .unwrap_or(Value::Null);

        Self {
            event_type,
            server_id: event.server_id,
            data,
        }
    }
}

impl TryFrom<WireEvent> for ServerEvent {
    type Error = String;

    fn try_from(wire: WireEvent) -> std::result::Result<Self, Self::Error> {
        fn info(data: Value) -> std::result::Result<ServerInfo, String> {
            serde_json::from_value(data).map_err(|e| format!("invalid server info: {}", e))
        }

        let kind = match wire.event_type.as_str() {
            "server.started" => EventKind::Started(info(wire.data)?),
            "server.stopped" => EventKind::Stopped(info(wire.data)?),
            "server.exited" => EventKind::Exited(info(wire.data)?),
            "server.crashed" => EventKind::Crashed(info(wire.data)?),
            "server.info" => EventKind::Info(info(wire.data)?),
            "server.log" => EventKind::Log(
                serde_json::from_value(wire.data)
                    .map_err(|e| format!("invalid log line: {}", e))?,
            ),
            other => return Err(format!("unknown event type '{}'", other)),
        };

        Ok(Self {
            server_id: wire.server_id,
            kind,
        })
    }
}
