/*!
 # mcs-manager

 A Rust library for supervising game-server processes and streaming their
 state and console output to web clients.

 ## Overview

 mcs-manager provides functionality to:
 - Create, start, stop, restart and delete server processes
 - Capture their console output into a bounded per-server log ring
 - Publish every state change, console line and metric update on an event bus
 - Serve the commands over HTTP and the event bus as Server-Sent Events
 - Consume that stream from Rust through a reconnecting, shared multiplexer

 ## Basic Usage

 ```no_run
 use mcs_manager::{Result, ServerManager};
 use mcs_manager::config::ServerConfig;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Load settings and the persisted servers
     let mut manager = ServerManager::from_config_file("mcs.yaml").await?;

     // Register a server and start it
     let supervisor = manager.supervisor().clone();
     let info = supervisor
         .create(ServerConfig {
             name: "survival".to_string(),
             eula: true,
             ..ServerConfig::default()
         })
         .await?;
     supervisor.start(&info.config.id).await?;

     // Expose the HTTP/SSE API
     manager.start_api().await?;

     tokio::signal::ctrl_c().await.ok();
     manager.shutdown().await
 }
 ```

 ## Features

 - **Process supervision**: readiness detection, graceful stop with kill fallback,
   crash detection with a recorded exit reason
 - **Event streaming**: broadcast bus with a bounded per-subscriber backlog
 - **HTTP API**: REST commands and an SSE event stream with CORS
 - **Client**: REST client and an event multiplexer with fixed-delay reconnects
 - **Configuration**: JSON or YAML config files
*/

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventBus, ServerEvent};
pub use server::{ServerId, ServerInfo, ServerState, Supervisor};

use api::{ApiHandle, HttpApi};
use server::{InfoMonitor, InfoMonitorConfig, JsonStore, ServerStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Wires the event bus, supervisor, info ticker and HTTP API together.
///
/// This struct is the main entry point for running a manager process.
pub struct ServerManager {
    /// Configuration
    config: Config,
    /// Bus shared by the supervisor and the API
    bus: EventBus,
    /// Server registry
    supervisor: Arc<Supervisor>,
    /// Periodic `server.info` publisher
    monitor: InfoMonitor,
    /// HTTP API handle (if running)
    api_handle: Option<ApiHandle>,
}

impl ServerManager {
    /// Create a manager from a JSON or YAML configuration file
    #[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::new(config).await
    }

    /// Create a manager persisting its servers to `<root>/servers.json`
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(JsonStore::new(&config.root));
        Self::with_store(config, store).await
    }

    /// Create a manager with a custom server store
    #[tracing::instrument(skip(config, store), fields(root = %config.root.display()))]
    pub async fn with_store(config: Config, store: Arc<dyn ServerStore>) -> Result<Self> {
        config::validate_config(&config)?;

        tokio::fs::create_dir_all(&config.root).await.map_err(|e| {
            Error::Other(format!("Failed to create {}: {}", config.root.display(), e))
        })?;

        let bus = EventBus::new(config.events.capacity);
        let supervisor = Arc::new(Supervisor::new(&config, bus.clone(), store).await?);

        let mut monitor = InfoMonitor::new(
            &supervisor,
            InfoMonitorConfig {
                interval: Duration::from_secs(config.supervisor.info_interval_secs),
            },
        );
        monitor.start();

        tracing::info!(servers = supervisor.list_all().len(), "Server manager ready");
        Ok(Self {
            config,
            bus,
            supervisor,
            monitor,
            api_handle: None,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the supervisor
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Get the event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start the HTTP API if it is not already running
    #[tracing::instrument(skip(self))]
    pub async fn start_api(&mut self) -> Result<&ApiHandle> {
        if self.api_handle.is_none() {
            let handle =
                HttpApi::start(self.supervisor.clone(), self.bus.clone(), &self.config.api).await?;
            self.api_handle = Some(handle);
        }

        self.api_handle
            .as_ref()
            .ok_or_else(|| Error::Other("HTTP API is not running".to_string()))
    }

    /// Get the HTTP API handle, if the API was started
    pub fn api_handle(&self) -> Option<&ApiHandle> {
        self.api_handle.as_ref()
    }

    /// Stop the API and the ticker, then gracefully stop every live server
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down server manager");

        if let Some(handle) = self.api_handle.take() {
            if let Err(e) = handle.shutdown().await {
                tracing::warn!(error = %e, "Error shutting down HTTP API");
            }
        }

        self.monitor.stop();
        self.supervisor.shutdown_all().await;

        tracing::info!("Server manager shut down");
        Ok(())
    }
}
