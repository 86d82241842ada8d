//! Persistence of server configurations.
//!
//! The supervisor keeps the authoritative registry in memory and writes the
//! full list back through a [`ServerStore`] after every create and delete.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// File name of the JSON store inside the manager root
pub const STORE_FILE: &str = "servers.json";

/// Load and save the list of known servers
#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Every persisted server configuration
    async fn load_all(&self) -> Result<Vec<ServerConfig>>;

    /// Replace the persisted list
    async fn save_all(&self, servers: &[ServerConfig]) -> Result<()>;
}

/// Stores the server list as a JSON array in a single file
#[derive(Debug, Clone)]
pub struct JsonStore {
    file: PathBuf,
}

impl JsonStore {
    /// Store at `<root>/servers.json`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            file: root.as_ref().join(STORE_FILE),
        }
    }

    /// Path of the backing file
    pub fn file(&self) -> &Path {
        &self.file
    }
}

#[async_trait]
impl ServerStore for JsonStore {
    async fn load_all(&self) -> Result<Vec<ServerConfig>> {
        let content = match tokio::fs::read_to_string(&self.file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(file = %self.file.display(), "No server store yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Store(format!(
                    "Failed to read {}: {}",
                    self.file.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| Error::Store(format!("Failed to parse {}: {}", self.file.display(), e)))
    }

    async fn save_all(&self, servers: &[ServerConfig]) -> Result<()> {
        let json = serde_json::to_string_pretty(servers)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = self.file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Store(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        // Write-then-rename so a crash never leaves a truncated store. Each
        // save has its own temp file so concurrent saves cannot mix.
        let tmp = self
            .file
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.file).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Store(format!(
                "Failed to replace {}: {}",
                self.file.display(),
                e
            )));
        }

        tracing::trace!(file = %self.file.display(), count = servers.len(), "Saved server store");
        Ok(())
    }
}

/// Keeps the server list in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    servers: Mutex<Vec<ServerConfig>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with `servers`
    pub fn with_servers(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers: Mutex::new(servers),
        }
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<ServerConfig>> {
        self.servers
            .lock()
            .map(|servers| servers.clone())
            .map_err(|_| Error::Store("Failed to lock memory store".to_string()))
    }

    async fn save_all(&self, servers: &[ServerConfig]) -> Result<()> {
        let mut stored = self
            .servers
            .lock()
            .map_err(|_| Error::Store("Failed to lock memory store".to_string()))?;
        *stored = servers.to_vec();
        Ok(())
    }
}

/// Ask the OS for a currently unused TCP port
pub fn pick_free_port() -> Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))
        .map_err(|e| Error::Other(format!("Failed to find a free port: {}", e)))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| Error::Other(format!("Failed to find a free port: {}", e)))
}
