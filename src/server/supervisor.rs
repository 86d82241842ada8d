use crate::config::{Config, ServerConfig, validate_server_config};
use crate::error::{Error, Result};
use crate::events::{EventBus, LogLine};
use crate::server::artifact;
use crate::server::lifecycle::{ServerInfo, ServerState};
use crate::server::process::{LaunchSettings, ProcessHandle, ServerId};
use crate::server::properties;
use crate::server::store::{ServerStore, pick_free_port};
use futures::future::join_all;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, MutexGuard};

/// Heap size for servers created without one
pub const DEFAULT_MEMORY_MB: u32 = 2048;

/// Version recorded for servers created without one
pub const DEFAULT_VERSION: &str = "latest";

struct ManagedServer {
    handle: ProcessHandle,
    op_lock: Mutex<()>,
    deleted: AtomicBool,
}

impl ManagedServer {
    /// Take the per-server command lock or fail right away
    fn try_lock(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.op_lock.try_lock().map_err(|_| {
            Error::Conflict(format!(
                "another command for server {} is in progress",
                self.handle.id()
            ))
        })?;
        if self.deleted.load(Ordering::Acquire) {
            return Err(Error::ServerNotFound(self.handle.id().to_string()));
        }
        Ok(guard)
    }
}

/// Owns every managed server and serializes lifecycle commands per server.
///
/// `start`, `stop`, `restart` and `delete` hold a per-server lock for their
/// whole duration; a second command for the same server arriving meanwhile
/// fails with [`Error::Conflict`] instead of queueing. Commands for different
/// servers run in parallel. Reads never take the command lock.
///
/// Every successful command that changes a snapshot publishes `server.info`
/// with the result. Deleting publishes nothing.
pub struct Supervisor {
    root: PathBuf,
    settings: Arc<LaunchSettings>,
    bus: EventBus,
    store: Arc<dyn ServerStore>,
    /// Held across snapshot and save so the newest snapshot is written last
    persist_lock: Mutex<()>,
    http: reqwest::Client,
    servers: RwLock<HashMap<ServerId, Arc<ManagedServer>>>,
}

impl Supervisor {
    /// Build a supervisor and load the persisted servers, all `stopped`
    pub async fn new(config: &Config, bus: EventBus, store: Arc<dyn ServerStore>) -> Result<Self> {
        let settings = Arc::new(LaunchSettings::from_config(&config.supervisor)?);
        let supervisor = Self {
            root: config.root.clone(),
            settings,
            bus,
            store,
            persist_lock: Mutex::new(()),
            http: artifact::http_client()?,
            servers: RwLock::new(HashMap::new()),
        };

        let configs = supervisor.store.load_all().await?;
        tracing::info!(count = configs.len(), root = %supervisor.root.display(), "Loaded servers");
        for server in configs {
            if server.id.is_empty() {
                tracing::warn!(name = %server.name, "Skipping stored server without an id");
                continue;
            }
            if let Err(e) = supervisor.insert(server) {
                tracing::warn!(error = %e, "Skipping duplicate stored server");
            }
        }

        Ok(supervisor)
    }

    /// Bus every server publishes to
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Directory new servers are created under
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Register a server unless its id is already taken
    fn insert(&self, config: ServerConfig) -> Result<Arc<ManagedServer>> {
        let id = config.id.clone();
        let server = Arc::new(ManagedServer {
            handle: ProcessHandle::new(config, self.settings.clone(), self.bus.clone()),
            op_lock: Mutex::new(()),
            deleted: AtomicBool::new(false),
        });
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        match servers.entry(id) {
            Entry::Occupied(entry) => Err(Error::Conflict(format!(
                "server {} already exists",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(server.clone());
                Ok(server)
            }
        }
    }

    fn server(&self, id: &ServerId) -> Result<Arc<ManagedServer>> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ServerNotFound(id.to_string()))
    }

    fn all(&self) -> Vec<Arc<ManagedServer>> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let mut configs: Vec<ServerConfig> = self
            .all()
            .iter()
            .map(|server| server.handle.config().clone())
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        if let Err(e) = self.store.save_all(&configs).await {
            tracing::error!(error = %e, "Failed to persist server list");
        }
    }

    /// Register a new server and prepare its directory.
    ///
    /// Missing fields are filled in: a generated id, `name = id`,
    /// `path = <root>/<id>`, a free port, 2048 MB and version `latest`.
    /// When the config names a `jarUrl` and no launch command, the jar is
    /// downloaded into the directory unless one is already there; a failed
    /// download fails the create.
    #[tracing::instrument(skip(self, config), fields(name = %config.name))]
    pub async fn create(&self, mut config: ServerConfig) -> Result<ServerInfo> {
        validate_server_config(&config)?;

        if config.id.is_empty() {
            config.id = ServerId::generate();
        }
        if self.server(&config.id).is_ok() {
            return Err(Error::Conflict(format!("server {} already exists", config.id)));
        }
        if config.name.trim().is_empty() {
            config.name = config.id.to_string();
        }
        if config.path.as_os_str().is_empty() {
            config.path = self.root.join(config.id.as_str());
        }
        if config.port == 0 {
            config.port = pick_free_port()?;
        }
        if config.memory_mb == 0 {
            config.memory_mb = DEFAULT_MEMORY_MB;
        }
        if config.version.trim().is_empty() {
            config.version = DEFAULT_VERSION.to_string();
        }

        tokio::fs::create_dir_all(&config.path).await.map_err(|e| {
            Error::Other(format!("Failed to create {}: {}", config.path.display(), e))
        })?;
        if config.eula {
            let eula = config.path.join("eula.txt");
            tokio::fs::write(&eula, "eula=true\n").await.map_err(|e| {
                Error::Other(format!("Failed to write {}: {}", eula.display(), e))
            })?;
        }
        properties::ensure_properties(&config.path, config.port)?;

        if let (None, Some(url)) = (&config.command, &config.jar_url) {
            artifact::ensure_jar(&self.http, url, &config.path).await?;
        }

        let server = self.insert(config)?;
        self.persist().await;

        let info = server.handle.info();
        tracing::info!(server_id = %info.config.id, port = info.config.port, "Server created");
        server.handle.publish_info();
        Ok(info)
    }

    /// Launch a server and wait until it is running.
    ///
    /// A running server is left alone; a crashed one is reset first.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn start(&self, id: &ServerId) -> Result<ServerInfo> {
        let server = self.server(id)?;
        let _guard = server.try_lock()?;
        let handle = &server.handle;

        if handle.state().is_live() {
            tracing::debug!(state = %handle.state(), "Server already live");
            return Ok(handle.info());
        }

        let result = handle.launch().await;
        handle.publish_info();
        result
    }

    /// Stop a server. `graceful = false` kills it right away.
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn stop(&self, id: &ServerId, graceful: bool) -> Result<ServerInfo> {
        let server = self.server(id)?;
        let _guard = server.try_lock()?;
        let handle = &server.handle;

        if !handle.state().is_live() {
            tracing::debug!(state = %handle.state(), "Server not live");
            return Ok(handle.info());
        }

        let info = handle.stop(graceful).await?;
        handle.publish_info();
        Ok(info)
    }

    /// Graceful stop (if live) followed by a launch, under one lock hold
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn restart(&self, id: &ServerId) -> Result<ServerInfo> {
        let server = self.server(id)?;
        let _guard = server.try_lock()?;
        let handle = &server.handle;

        if handle.state().is_live() {
            handle.stop(true).await?;
        }

        let result = handle.launch().await;
        handle.publish_info();
        result
    }

    /// Forget a stopped server and remove its directory if it lies under the
    /// manager root
    #[tracing::instrument(skip(self), fields(server_id = %id))]
    pub async fn delete(&self, id: &ServerId) -> Result<()> {
        let server = self.server(id)?;
        let _guard = server.try_lock()?;

        let state = server.handle.state();
        if state != ServerState::Stopped {
            return Err(Error::Precondition(format!(
                "server {} must be stopped before it is deleted (state: {})",
                id, state
            )));
        }

        server.deleted.store(true, Ordering::Release);
        self.servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        self.persist().await;

        let path = &server.handle.config().path;
        if path.starts_with(&self.root) && path != &self.root {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove server directory");
            }
        }

        tracing::info!("Server deleted");
        Ok(())
    }

    /// Write a console command to a running server
    pub async fn send_command(&self, id: &ServerId, command: &str) -> Result<()> {
        let server = self.server(id)?;
        server.handle.send_command(command).await
    }

    /// Snapshots of every server, sorted by name
    pub fn list_all(&self) -> Vec<ServerInfo> {
        let mut infos: Vec<ServerInfo> = self.all().iter().map(|s| s.handle.info()).collect();
        infos.sort_by(|a, b| {
            a.config
                .name
                .cmp(&b.config.name)
                .then_with(|| a.config.id.cmp(&b.config.id))
        });
        infos
    }

    /// Snapshot of one server
    pub fn get_by_id(&self, id: &ServerId) -> Result<ServerInfo> {
        Ok(self.server(id)?.handle.info())
    }

    /// Recent console lines of one server, oldest first
    pub fn logs(&self, id: &ServerId) -> Result<Vec<LogLine>> {
        Ok(self.server(id)?.handle.logs())
    }

    /// Recent console lines of one server as plain text
    pub fn logs_text(&self, id: &ServerId) -> Result<String> {
        Ok(self.server(id)?.handle.logs_text())
    }

    /// Publish `server.info` for every running server
    pub fn publish_running_info(&self) {
        for server in self.all() {
            if server.handle.state() == ServerState::Running {
                server.handle.publish_info();
            }
        }
    }

    /// Gracefully stop every live server, in parallel
    pub async fn shutdown_all(&self) {
        let live: Vec<ServerId> = self
            .all()
            .iter()
            .filter(|s| s.handle.state().is_live())
            .map(|s| s.handle.id().clone())
            .collect();
        if live.is_empty() {
            return;
        }

        tracing::info!(count = live.len(), "Stopping all servers");
        let results = join_all(live.iter().map(|id| self.stop(id, true))).await;
        for (id, result) in live.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(server_id = %id, error = %e, "Failed to stop server during shutdown");
            }
        }
    }
}
