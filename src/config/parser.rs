use crate::error::{Error, Result};
use crate::server::ServerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of actix-web worker threads for the HTTP API.
pub const DEFAULT_WORKERS: usize = 4;

/// Default readiness marker. Vanilla, Paper and Fabric all print
/// `Done (4.213s)! For help, type "help"` once the world is loaded.
pub const DEFAULT_READY_PATTERN: &str = r"Done \(.*\)!";

/// Flavour of game server. Only affects defaults; the process itself is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Mojang's reference server
    #[default]
    Vanilla,
    /// Paper
    Paper,
    /// Fabric
    Fabric,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vanilla => f.write_str("vanilla"),
            Self::Paper => f.write_str("paper"),
            Self::Fabric => f.write_str("fabric"),
        }
    }
}

/// Configuration for a single managed server.
///
/// Fields left empty or zero when creating a server are filled in by the
/// supervisor (id, name, path, port, memory, version). The config is immutable
/// once the server exists.
///
/// By default a server is launched as
/// `java -Xmx<memoryMb>M -jar server.jar nogui` inside `path`. Setting
/// `command` replaces that with an explicit program, `args` and `env`.
///
/// # Examples
///
/// ```
/// use mcs_manager::config::{ServerConfig, ServerType};
///
/// let config = ServerConfig {
///     name: "survival".to_string(),
///     server_type: ServerType::Paper,
///     version: "1.21.10".to_string(),
///     eula: true,
///     ..ServerConfig::default()
/// };
/// assert!(config.port == 0, "port is assigned on create");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Opaque server identity. Assigned on create when empty.
    #[serde(default)]
    pub id: ServerId,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Server flavour.
    #[serde(rename = "type", default)]
    pub server_type: ServerType,

    /// Game version string, `latest` when unspecified.
    #[serde(default)]
    pub version: String,

    /// Network port the game listens on. 0 means "pick one on create".
    #[serde(default)]
    pub port: u16,

    /// Heap size passed to the JVM, in megabytes.
    #[serde(default)]
    pub memory_mb: u32,

    /// Working directory of the server.
    #[serde(default)]
    pub path: PathBuf,

    /// Whether the EULA has been accepted.
    #[serde(default)]
    pub eula: bool,

    /// Where the server artifact can be downloaded from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar_url: Option<String>,

    /// Explicit program to run instead of the JVM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for `command`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment variables for the process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// HTTP API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    /// Address to bind to
    pub address: String,
    /// Port to listen on
    pub port: u16,
    /// Number of actix-web workers
    pub workers: Option<usize>,
    /// Interval between SSE keep-alive comments, in seconds
    pub keep_alive_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8484,
            workers: None,
            keep_alive_secs: 15,
        }
    }
}

/// Process supervision settings shared by every managed server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    /// Number of recent console lines kept per server
    pub log_capacity: usize,
    /// Regular expression marking a server as ready
    pub ready_pattern: String,
    /// Seconds after spawn at which a server counts as ready without a marker
    pub ready_grace_secs: u64,
    /// Seconds a graceful stop may take before the process is killed
    pub stop_timeout_secs: u64,
    /// Console command that asks the server to shut down
    pub stop_command: String,
    /// JVM executable used for servers without an explicit command
    pub java_command: String,
    /// Seconds between periodic `server.info` broadcasts, 0 disables them
    pub info_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_capacity: 200,
            ready_pattern: DEFAULT_READY_PATTERN.to_string(),
            ready_grace_secs: 60,
            stop_timeout_secs: 30,
            stop_command: "stop".to_string(),
            java_command: if cfg!(windows) { "java.exe" } else { "java" }.to_string(),
            info_interval_secs: 10,
        }
    }
}

impl SupervisorConfig {
    /// Readiness grace period
    pub fn ready_grace(&self) -> Duration {
        Duration::from_secs(self.ready_grace_secs)
    }

    /// Graceful stop timeout
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventsConfig {
    /// How many events a subscriber may fall behind before losing the oldest
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Main configuration for the server manager.
///
/// # JSON Schema
///
/// Every section is optional:
///
/// ```json
/// {
///   "root": "/srv/mcs-servers",
///   "api": { "address": "127.0.0.1", "port": 8484 },
///   "supervisor": {
///     "logCapacity": 200,
///     "readyGraceSecs": 60,
///     "stopTimeoutSecs": 30
///   },
///   "events": { "capacity": 256 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding one sub-directory per server and `servers.json`.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// HTTP API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Process supervision settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Event bus settings.
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            api: ApiConfig::default(),
            supervisor: SupervisorConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

fn default_root() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mcs-servers")
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = Config::parse_from_str("{}").unwrap();

        assert_eq!(config.api.port, 8484);
        assert_eq!(config.supervisor.log_capacity, 200);
        assert_eq!(config.supervisor.stop_command, "stop");
        assert_eq!(config.events.capacity, 256);
        assert!(config.root.ends_with("mcs-servers"));
    }

    #[test]
    fn test_parse_server_config_wire_names() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"name":"lobby","type":"fabric","version":"1.21.10","port":0,"memoryMb":4096,"eula":true}"#,
        )
        .unwrap();

        assert_eq!(config.server_type, ServerType::Fabric);
        assert_eq!(config.memory_mb, 4096);
        assert!(config.id.is_empty());
        assert!(config.command.is_none());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "fabric");
        assert_eq!(json["memoryMb"], 4096);
        assert!(json.get("jarUrl").is_none());
    }
}
