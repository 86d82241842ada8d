//! Request bodies and query parameters accepted by the HTTP API.

use crate::config::{ServerConfig, ServerType};
use serde::{Deserialize, Serialize};

/// Body of `POST /servers`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateServerRequest {
    /// Display name
    pub name: String,
    /// Server flavour
    #[serde(rename = "type")]
    pub server_type: ServerType,
    /// Game version
    pub version: String,
    /// Game port, 0 to pick one
    pub port: u16,
    /// JVM heap in megabytes, 0 for the default
    pub memory_mb: u32,
    /// Whether the EULA is accepted
    pub eula: bool,
    /// Download location of the server artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jar_url: Option<String>,
}

impl From<CreateServerRequest> for ServerConfig {
    fn from(request: CreateServerRequest) -> Self {
        ServerConfig {
            name: request.name,
            server_type: request.server_type,
            version: request.version,
            port: request.port,
            memory_mb: request.memory_mb,
            eula: request.eula,
            jar_url: request.jar_url,
            ..ServerConfig::default()
        }
    }
}

/// Body of `POST /servers/{id}/cmd`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Console command, without trailing newline
    pub command: String,
}

/// Query of `POST /servers/{id}/stop`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopQuery {
    /// Kill without asking the server to stop first
    #[serde(default)]
    pub force: bool,
}
