/// Server management module.
///
/// This module owns the game-server processes: it launches them, drains their
/// console output, tracks their lifecycle and serializes the commands issued
/// against them. All public entry points are instrumented with `tracing` spans.
///
/// # Components
///
/// * `lifecycle` - Server states, legal transitions and the `ServerInfo` snapshot
/// * `process` - One child process: launch, readiness, stop, console input
/// * `supervisor` - The registry of servers and the per-server command lock
/// * `log_ring` - Bounded buffer of recent console lines
/// * `console` - Capped line reads and the per-server `mcs.log` file
/// * `artifact` - Download of the server jar from `jarUrl`
/// * `store` - Persistence of server configurations
/// * `monitor` - Periodic `server.info` ticker
///
/// # Examples
///
/// Creating and starting a server:
///
/// ```no_run
/// use mcs_manager::config::{Config, ServerConfig};
/// use mcs_manager::events::EventBus;
/// use mcs_manager::server::{MemoryStore, Supervisor};
/// use std::sync::Arc;
///
/// # async fn run() -> mcs_manager::error::Result<()> {
/// let config = Config::default();
/// let supervisor =
///     Supervisor::new(&config, EventBus::default(), Arc::new(MemoryStore::new())).await?;
///
/// let info = supervisor
///     .create(ServerConfig {
///         name: "survival".to_string(),
///         eula: true,
///         ..ServerConfig::default()
///     })
///     .await?;
/// let running = supervisor.start(&info.config.id).await?;
/// println!("{} is {} (pid {})", running.config.name, running.state, running.pid);
/// # Ok(())
/// # }
/// ```
///
/// Keeping uptime fresh for subscribers:
///
/// ```no_run
/// use mcs_manager::server::{InfoMonitor, InfoMonitorConfig, Supervisor};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn run(supervisor: Arc<Supervisor>) {
/// let mut monitor = InfoMonitor::new(
///     &supervisor,
///     InfoMonitorConfig {
///         interval: Duration::from_secs(5),
///     },
/// );
/// monitor.start();
/// # }
/// ```
mod artifact;
mod console;
pub mod lifecycle;
pub mod log_ring;
pub mod monitor;
mod players;
mod process;
pub mod properties;
pub mod store;
mod supervisor;

pub use lifecycle::{PlayerInfo, ServerInfo, ServerState};
pub use log_ring::LogRing;
pub use monitor::{InfoMonitor, InfoMonitorConfig};
pub use players::PlayerTracker;
pub use process::{LaunchSettings, ProcessHandle, ServerId};
pub use store::{JsonStore, MemoryStore, ServerStore, pick_free_port};
pub use supervisor::Supervisor;
