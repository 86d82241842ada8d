use crate::server::supervisor::Supervisor;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Info ticker configuration
#[derive(Debug, Clone)]
pub struct InfoMonitorConfig {
    /// Time between two rounds of `server.info` events. Zero disables the ticker.
    pub interval: Duration,
}

impl Default for InfoMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Periodically republishes the snapshot of every running server so that
/// subscribers see uptime and player counts move without polling.
pub struct InfoMonitor {
    supervisor: Weak<Supervisor>,
    config: InfoMonitorConfig,
    task: Option<JoinHandle<()>>,
}

impl InfoMonitor {
    /// Create a monitor; it does nothing until started
    pub fn new(supervisor: &Arc<Supervisor>, config: InfoMonitorConfig) -> Self {
        Self {
            supervisor: Arc::downgrade(supervisor),
            config,
            task: None,
        }
    }

    /// Whether the ticker task is active
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start the monitor
    pub fn start(&mut self) {
        if self.task.is_some() || self.config.interval.is_zero() {
            return;
        }

        let supervisor = self.supervisor.clone();
        let interval = self.config.interval;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                // The supervisor owns the servers; once it is gone there is
                // nothing left to report on
                let Some(supervisor) = supervisor.upgrade() else {
                    break;
                };
                supervisor.publish_running_info();
            }
            tracing::debug!("Info monitor finished");
        });

        tracing::debug!(interval_secs = interval.as_secs(), "Info monitor started");
        self.task = Some(task);
    }

    /// Stop the monitor
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for InfoMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
