/// Error handling module for the server manager.
///
/// This module defines the error types used throughout the library.
/// Lifecycle commands surface these synchronously to their caller; failures
/// that happen inside a running process (output draining, exit waiting) are
/// never reported here and show up as a `crashed` state instead.
///
/// # Example
///
/// ```
/// use mcs_manager::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::ServerNotFound(id)) => println!("No server with id '{}'", id),
///         Err(Error::Conflict(msg)) => println!("Try again later: {}", msg),
///         Err(Error::NotRunning(id)) => println!("Server '{}' is not running", id),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Reasons a process launch can fail.
///
/// Every variant except [`LaunchError::ExitedDuringStartup`] leaves the server
/// in the terminal state it had before the launch was attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The server's working directory does not exist.
    #[error("server directory does not exist: {0}")]
    MissingPath(String),

    /// The server artifact (jar) or configured command could not be found.
    #[error("server artifact not found: {0}")]
    MissingArtifact(String),

    /// Another process is already bound to the configured port.
    #[error("port {0} is already in use")]
    PortInUse(u16),

    /// The operating system refused to spawn the process.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// The process exited before it became ready. The server is `crashed`.
    #[error("process exited during startup: {0}")]
    ExitedDuringStartup(String),
}

/// Errors that can occur in the mcs-manager library.
///
/// This enum represents all possible error types that can be returned from
/// operations in this library. Each variant includes context information to
/// help diagnose and handle the error appropriately.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The configuration JSON or YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - The manager root is empty
    /// - The readiness pattern is not a valid regular expression
    /// - A capacity or timeout is zero where it must not be
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Launching the managed process failed.
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Another mutating command for the same server is still in flight.
    ///
    /// This error occurs when:
    /// - `start` is called while a previous `start` has not completed
    /// - `delete` races with `stop` or `restart`
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The server is in the wrong state for the requested transition.
    ///
    /// This error occurs when:
    /// - Deleting a server that is not stopped
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A console command was sent to a server that is not running.
    #[error("Server not running: {0}")]
    NotRunning(String),

    /// No server with the requested id exists.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// Reading from or writing to a stream failed.
    ///
    /// This error occurs when:
    /// - Writing to a process's stdin fails
    /// - An HTTP request or event stream to the manager fails
    #[error("Transport error: {0}")]
    Transport(String),

    /// Fetching the server artifact from its `jarUrl` failed.
    #[error("Download error: {0}")]
    Download(String),

    /// Reading or writing the persisted server list failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Error in serializing or deserializing data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable name of the variant, sent in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConfigParse(_) => "config_parse",
            Error::ConfigInvalid(_) => "config_invalid",
            Error::Launch(_) => "launch",
            Error::Conflict(_) => "conflict",
            Error::Precondition(_) => "precondition",
            Error::NotRunning(_) => "not_running",
            Error::ServerNotFound(_) => "not_found",
            Error::Transport(_) => "transport",
            Error::Download(_) => "download",
            Error::Store(_) => "store",
            Error::Serialization(_) => "serialization",
            Error::Other(_) => "other",
        }
    }

    /// Rebuild an error from a [`kind`](Error::kind) and message received
    /// over the API. Kinds that carry structured data (`launch`) or are
    /// unknown yield `None`.
    pub fn from_kind(kind: &str, message: String) -> Option<Self> {
        Some(match kind {
            "config_parse" => Error::ConfigParse(message),
            "config_invalid" => Error::ConfigInvalid(message),
            "conflict" => Error::Conflict(message),
            "precondition" => Error::Precondition(message),
            "not_running" => Error::NotRunning(message),
            "not_found" => Error::ServerNotFound(message),
            "transport" => Error::Transport(message),
            "download" => Error::Download(message),
            "store" => Error::Store(message),
            "serialization" => Error::Serialization(message),
            "other" => Error::Other(message),
            _ => return None,
        })
    }
}

/// Result type for mcs-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
