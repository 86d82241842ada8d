use crate::config::ServerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed server.
///
/// ```text
/// stopped ──► starting ──► running ──► stopped
///                │            │
///                ├──► stopped └──► crashed
///                └──► crashed
/// ```
///
/// `crashed` and `stopped` are terminal until the next launch, which always
/// begins from `stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// No process
    #[default]
    Stopped,
    /// Process spawned, not yet ready
    Starting,
    /// Process ready
    Running,
    /// Process ended unexpectedly or had to be killed
    Crashed,
}

impl ServerState {
    /// Whether a process exists in this state
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Whether this state ends a process run
    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Starting, Stopped)
                | (Running, Stopped)
                | (Running, Crashed)
                | (Crashed, Stopped)
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Crashed => f.write_str("crashed"),
        }
    }
}

/// Live player count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Players online
    pub current: u32,
    /// Player limit
    pub max: u32,
}

/// Snapshot of one server, broadcast on every state or metric change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Server configuration
    pub config: ServerConfig,
    /// Current lifecycle state
    pub state: ServerState,
    /// OS process id, 0 unless starting or running
    pub pid: u32,
    /// Seconds since the process was spawned, 0 when not live
    pub uptime_sec: u64,
    /// Description of the last abnormal exit, empty if clean or never run
    pub last_exit_err: String,
    /// Player count, only known while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<PlayerInfo>,
}
