// src/server/process.rs
use crate::config::{ServerConfig, SupervisorConfig};
use crate::error::{Error, LaunchError, Result};
use crate::events::{EventBus, EventKind, LogLine, LogStream, ServerEvent};
use crate::server::console::{self, ConsoleLog};
use crate::server::lifecycle::{ServerInfo, ServerState};
use crate::server::log_ring::LogRing;
use crate::server::players::PlayerTracker;
use crate::server::properties;
use async_process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use futures_lite::io::{AsyncRead, AsyncWriteExt, BufReader};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::TcpListener;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout_at;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long the exit watcher waits for output to drain after the process died.
/// A grandchild holding the pipes open must not delay the terminal event forever.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for writing one console command into a child's stdin
const COMMAND_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Unique identifier for a managed server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id (12 hex characters)
    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(12);
        Self(id)
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is unset
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ServerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Supervisor-wide launch policy shared by every handle
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// JVM executable for servers without an explicit command
    pub java_command: String,
    /// Console command written to stdin for a graceful stop
    pub stop_command: String,
    /// Output line marking the server as ready
    pub ready_pattern: Regex,
    /// Time after spawn at which the server counts as ready without a marker
    pub ready_grace: Duration,
    /// Time a graceful stop may take before the process is killed
    pub stop_timeout: Duration,
    /// Lines kept in each server's log ring
    pub log_capacity: usize,
}

impl LaunchSettings {
    /// Build settings from configuration, compiling the readiness pattern
    pub fn from_config(config: &SupervisorConfig) -> Result<Self> {
        let ready_pattern = Regex::new(&config.ready_pattern).map_err(|e| {
            Error::ConfigInvalid(format!("Invalid readiness pattern: {}", e))
        })?;

        Ok(Self {
            java_command: config.java_command.clone(),
            stop_command: config.stop_command.clone(),
            ready_pattern,
            ready_grace: config.ready_grace(),
            stop_timeout: config.stop_timeout(),
            log_capacity: config.log_capacity,
        })
    }
}

impl Default for LaunchSettings {
    fn default() -> Self {
        // The default pattern is a constant known to compile
        Self::from_config(&SupervisorConfig::default()).expect("default settings are valid")
    }
}

/// Why the current run is being ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopRequest {
    /// Stop command written, waiting for a clean exit
    Graceful,
    /// Graceful stop timed out, process killed
    TimedOut,
    /// Killed on request without asking first
    Forced,
}

#[derive(Debug, Default)]
struct Status {
    state: ServerState,
    pid: u32,
    started_at: Option<Instant>,
    last_exit_err: String,
    players: Option<PlayerTracker>,
    stop_request: Option<StopRequest>,
}

struct Shared {
    config: ServerConfig,
    settings: Arc<LaunchSettings>,
    bus: EventBus,
    status: Mutex<Status>,
    logs: Mutex<LogRing>,
    console_log: Mutex<Option<ConsoleLog>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    state_tx: watch::Sender<ServerState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn id(&self) -> &ServerId {
        &self.config.id
    }

    fn snapshot(&self, status: &Status) -> ServerInfo {
        let live = status.state.is_live();
        ServerInfo {
            config: self.config.clone(),
            state: status.state,
            pid: if live { status.pid } else { 0 },
            uptime_sec: match status.started_at {
                Some(at) if live => at.elapsed().as_secs(),
                _ => 0,
            },
            last_exit_err: status.last_exit_err.clone(),
            players: match (&status.players, status.state) {
                (Some(tracker), ServerState::Running) => Some(tracker.snapshot()),
                _ => None,
            },
        }
    }

    fn info(&self) -> ServerInfo {
        self.snapshot(&lock(&self.status))
    }

    /// Publish while the status lock is held so state events leave in the
    /// order the state changed.
    fn publish_locked(&self, _status: &Status, kind: EventKind) {
        self.bus.publish(ServerEvent::new(self.id().clone(), kind));
    }

    fn set_state(&self, status: &mut Status, next: ServerState) {
        if !status.state.can_transition_to(next) {
            tracing::warn!(
                server_id = %self.id(),
                from = %status.state,
                to = %next,
                "Unexpected state transition"
            );
        }
        status.state = next;
        self.state_tx.send_replace(next);
    }

    /// Route one console line to the log ring and the bus, then let the
    /// readiness and player observers look at it.
    fn handle_line(&self, stream: LogStream, line: String) {
        if let Some(log) = lock(&self.console_log).as_mut() {
            if let Err(e) = log.append(&line) {
                tracing::warn!(server_id = %self.id(), error = %e, "Failed to write console log");
            }
        }

        let entry = LogLine::new(stream, line);
        lock(&self.logs).append(entry.clone());

        let ready = self.settings.ready_pattern.is_match(&entry.line);
        let text = entry.line.clone();
        self.bus
            .publish(ServerEvent::new(self.id().clone(), EventKind::Log(entry)));

        if ready {
            self.mark_running();
        }

        let mut status = lock(&self.status);
        if status.state != ServerState::Running {
            return;
        }
        let changed = status
            .players
            .as_mut()
            .is_some_and(|tracker| tracker.observe(&text));
        if changed {
            let info = self.snapshot(&status);
            self.publish_locked(&status, EventKind::Info(info));
        }
    }

    /// `starting -> running`; no-op from any other state
    fn mark_running(&self) {
        let max_players = properties::max_players(&self.config.path);

        let mut status = lock(&self.status);
        if status.state != ServerState::Starting {
            return;
        }
        self.set_state(&mut status, ServerState::Running);
        status.players = Some(PlayerTracker::new(max_players));

        let info = self.snapshot(&status);
        tracing::info!(server_id = %self.id(), pid = info.pid, "Server is running");
        self.publish_locked(&status, EventKind::Started(info));
    }

    /// Record the outcome of a run and publish its single terminal event
    fn finish_run(&self, exit: std::io::Result<ExitStatus>) {
        let (success, description) = match exit {
            Ok(status) => (status.success(), status.to_string()),
            Err(e) => (false, format!("failed to wait for process: {}", e)),
        };

        let mut status = lock(&self.status);
        let request = status.stop_request.take();

        let (state, last_exit_err) = match request {
            Some(StopRequest::Graceful) if success => (ServerState::Stopped, String::new()),
            Some(StopRequest::Graceful) => (ServerState::Stopped, description.clone()),
            Some(StopRequest::Forced) => (ServerState::Stopped, description.clone()),
            Some(StopRequest::TimedOut) => (
                ServerState::Crashed,
                format!(
                    "did not stop within {}s, killed ({})",
                    self.settings.stop_timeout.as_secs(),
                    description
                ),
            ),
            None => (
                ServerState::Crashed,
                format!("process exited unexpectedly ({})", description),
            ),
        };

        self.set_state(&mut status, state);
        status.pid = 0;
        status.started_at = None;
        status.players = None;
        status.last_exit_err = last_exit_err;
        lock(&self.kill_tx).take();
        lock(&self.console_log).take();

        let info = self.snapshot(&status);
        let kind = match request {
            Some(StopRequest::Graceful) => EventKind::Stopped(info),
            Some(StopRequest::Forced) => EventKind::Exited(info),
            Some(StopRequest::TimedOut) | None => EventKind::Crashed(info),
        };

        match &kind {
            EventKind::Crashed(info) => tracing::error!(
                server_id = %self.id(),
                error = %info.last_exit_err,
                "Server crashed"
            ),
            _ => tracing::info!(server_id = %self.id(), exit = %description, "Server stopped"),
        }
        self.publish_locked(&status, kind);
    }
}

/// One managed game-server process.
///
/// The handle owns the child process for the duration of a run: two tasks
/// drain stdout and stderr line by line into the [`LogRing`] and the
/// [`EventBus`], and a watcher task waits for the exit and records its
/// outcome. Exactly one terminal event (`server.stopped`, `server.exited` or
/// `server.crashed`) is published per run.
///
/// # Readiness
///
/// A run moves from `starting` to `running` on the first output line that
/// matches [`LaunchSettings::ready_pattern`], or when
/// [`LaunchSettings::ready_grace`] has elapsed since the spawn, whichever
/// comes first.
///
/// The handle does not serialize callers; the supervisor does.
#[derive(Clone)]
pub struct ProcessHandle {
    shared: Arc<Shared>,
}

impl ProcessHandle {
    /// Create a handle for a server that is not running. The log ring starts
    /// out with the tail of the server's `mcs.log`.
    pub fn new(config: ServerConfig, settings: Arc<LaunchSettings>, bus: EventBus) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        let mut logs = LogRing::with_capacity(settings.log_capacity);
        match console::read_tail(&config.path, logs.capacity()) {
            Ok(lines) => {
                for line in lines {
                    logs.append(LogLine::new(LogStream::Stdout, line));
                }
            }
            Err(e) => {
                tracing::warn!(server_id = %config.id, error = %e, "Failed to read console log");
            }
        }
        Self {
            shared: Arc::new(Shared {
                config,
                settings,
                bus,
                status: Mutex::new(Status::default()),
                logs: Mutex::new(logs),
                console_log: Mutex::new(None),
                stdin: tokio::sync::Mutex::new(None),
                kill_tx: Mutex::new(None),
                state_tx,
            }),
        }
    }

    /// Get the server ID
    pub fn id(&self) -> &ServerId {
        self.shared.id()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Get the current state
    pub fn state(&self) -> ServerState {
        lock(&self.shared.status).state
    }

    /// Point-in-time snapshot of the server
    pub fn info(&self) -> ServerInfo {
        self.shared.info()
    }

    /// Recent console lines, oldest first
    pub fn logs(&self) -> Vec<LogLine> {
        lock(&self.shared.logs).snapshot()
    }

    /// Recent console lines as plain text
    pub fn logs_text(&self) -> String {
        lock(&self.shared.logs).render()
    }

    /// Publish a `server.info` event with the current snapshot
    pub fn publish_info(&self) {
        let status = lock(&self.shared.status);
        let info = self.shared.snapshot(&status);
        self.shared.publish_locked(&status, EventKind::Info(info));
    }

    /// Start the process and wait until it is running.
    ///
    /// A `crashed` server passes through `stopped` once the process is
    /// spawned. Returns the `running` snapshot, or a [`LaunchError`]; a launch
    /// that fails before spawning leaves the state untouched, and
    /// [`LaunchError::ExitedDuringStartup`] leaves the server `crashed`.
    pub async fn launch(&self) -> Result<ServerInfo> {
        let shared = &self.shared;
        {
            let status = lock(&shared.status);
            if status.state.is_live() {
                return Err(Error::Precondition(format!(
                    "server {} is already {}",
                    shared.id(),
                    status.state
                )));
            }
        }

        let mut child = self.spawn().map_err(|e| {
            tracing::error!(server_id = %shared.id(), error = %e, "Failed to launch server");
            Error::Launch(e)
        })?;
        let pid = child.id();

        match ConsoleLog::open(&shared.config.path) {
            Ok(log) => *lock(&shared.console_log) = Some(log),
            Err(e) => {
                tracing::warn!(server_id = %shared.id(), error = %e, "Failed to open console log");
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *shared.stdin.lock().await = child.stdin.take();
        let (kill_tx, kill_rx) = oneshot::channel();
        *lock(&shared.kill_tx) = Some(kill_tx);

        let mut state_rx = shared.state_tx.subscribe();
        {
            let mut status = lock(&shared.status);
            status.pid = pid;
            status.started_at = Some(Instant::now());
            status.last_exit_err.clear();
            status.players = None;
            status.stop_request = None;
            if status.state == ServerState::Crashed {
                shared.set_state(&mut status, ServerState::Stopped);
            }
            shared.set_state(&mut status, ServerState::Starting);
            let info = shared.snapshot(&status);
            shared.publish_locked(&status, EventKind::Info(info));
        }
        tracing::info!(server_id = %shared.id(), pid, "Server process spawned");

        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = stdout {
            drains.push(tokio::spawn(drain(shared.clone(), stdout, LogStream::Stdout)));
        }
        if let Some(stderr) = stderr {
            drains.push(tokio::spawn(drain(shared.clone(), stderr, LogStream::Stderr)));
        }
        tokio::spawn(watch_exit(shared.clone(), child, kill_rx, drains));

        let ready = tokio::time::timeout(
            shared.settings.ready_grace,
            state_rx.wait_for(|state| *state != ServerState::Starting),
        )
        .await;
        if ready.is_err() {
            tracing::debug!(server_id = %shared.id(), "Readiness grace period elapsed");
            shared.mark_running();
        }

        let info = self.info();
        match info.state {
            ServerState::Running => Ok(info),
            _ => Err(LaunchError::ExitedDuringStartup(info.last_exit_err).into()),
        }
    }

    fn spawn(&self) -> std::result::Result<Child, LaunchError> {
        let config = &self.shared.config;
        let settings = &self.shared.settings;

        if !config.path.is_dir() {
            return Err(LaunchError::MissingPath(config.path.display().to_string()));
        }

        let mut command = match &config.command {
            Some(program) => {
                let mut command = Command::new(program);
                command.args(&config.args);
                command
            }
            None => {
                let jar = config.path.join("server.jar");
                if !jar.is_file() {
                    return Err(LaunchError::MissingArtifact(jar.display().to_string()));
                }
                let mut command = Command::new(&settings.java_command);
                command
                    .arg(format!("-Xmx{}M", config.memory_mb))
                    .arg("-jar")
                    .arg(jar)
                    .arg("nogui");
                command
            }
        };

        if config.port != 0 && TcpListener::bind(("0.0.0.0", config.port)).is_err() {
            return Err(LaunchError::PortInUse(config.port));
        }

        command
            .current_dir(&config.path)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LaunchError::MissingArtifact(
                config.command.clone().unwrap_or_else(|| settings.java_command.clone()),
            ),
            _ => LaunchError::Spawn(e.to_string()),
        })
    }

    /// Stop the process.
    ///
    /// Graceful stops write the configured stop command and wait for the exit;
    /// writing and waiting share one stop-timeout budget, after which the
    /// process is killed. The server ends `stopped` on a timely exit and
    /// `crashed` otherwise. Forced stops kill immediately and end `stopped`.
    /// Stopping a server that is not live is a no-op.
    pub async fn stop(&self, graceful: bool) -> Result<ServerInfo> {
        let shared = &self.shared;
        let mut state_rx = shared.state_tx.subscribe();
        {
            let mut status = lock(&shared.status);
            if !status.state.is_live() {
                return Ok(shared.snapshot(&status));
            }
            status.stop_request = Some(if graceful {
                StopRequest::Graceful
            } else {
                StopRequest::Forced
            });
        }

        if graceful {
            tracing::info!(server_id = %shared.id(), "Requesting graceful stop");
            let deadline = tokio::time::Instant::now() + shared.settings.stop_timeout;

            // A child that stopped reading stdin can block the write forever
            match timeout_at(deadline, self.write_line(&shared.settings.stop_command)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(server_id = %shared.id(), error = %e, "Failed to send stop command");
                }
                Err(_) => {
                    tracing::warn!(server_id = %shared.id(), "Stop command could not be written in time");
                }
            }

            let exited = timeout_at(deadline, state_rx.wait_for(|state| state.is_terminal()))
                .await
                .is_ok();

            if !exited {
                {
                    let mut status = lock(&shared.status);
                    if status.state.is_live() && status.stop_request == Some(StopRequest::Graceful)
                    {
                        status.stop_request = Some(StopRequest::TimedOut);
                    }
                }
                tracing::warn!(server_id = %shared.id(), "Graceful stop timed out, killing process");
                self.kill();
                let _ = state_rx.wait_for(|state| state.is_terminal()).await;
            }
        } else {
            tracing::info!(server_id = %shared.id(), "Killing server process");
            self.kill();
            let _ = state_rx.wait_for(|state| state.is_terminal()).await;
        }

        Ok(self.info())
    }

    fn kill(&self) {
        if let Some(kill_tx) = lock(&self.shared.kill_tx).take() {
            let _ = kill_tx.send(());
        }
    }

    /// Write one console command to the process's stdin
    pub async fn send_command(&self, text: &str) -> Result<()> {
        if self.state() != ServerState::Running {
            return Err(Error::NotRunning(self.id().to_string()));
        }
        tracing::debug!(server_id = %self.id(), command = %text, "Sending console command");
        tokio::time::timeout(COMMAND_WRITE_TIMEOUT, self.write_line(text))
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "server {} did not accept the command within {}s",
                    self.id(),
                    COMMAND_WRITE_TIMEOUT.as_secs()
                ))
            })?
    }

    async fn write_line(&self, text: &str) -> Result<()> {
        let mut stdin = self.shared.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| Error::NotRunning(self.id().to_string()))?;

        let mut data = text.trim_end_matches(['\r', '\n']).to_string();
        data.push('\n');
        pipe.write_all(data.as_bytes())
            .await
            .map_err(|e| Error::Transport(format!("Failed to write to stdin: {}", e)))?;
        pipe.flush()
            .await
            .map_err(|e| Error::Transport(format!("Failed to flush stdin: {}", e)))
    }
}

/// Read one output stream to EOF, one line at a time. Invalid UTF-8 is
/// replaced rather than ending the stream and overlong lines are split, so
/// the child never blocks on a full pipe.
async fn drain<R>(shared: Arc<Shared>, reader: R, stream: LogStream)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match console::read_line_capped(&mut reader, &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                shared.handle_line(stream, line);
            }
            Err(e) => {
                tracing::warn!(server_id = %shared.id(), %stream, error = %e, "Output stream failed");
                break;
            }
        }
    }
    tracing::trace!(server_id = %shared.id(), %stream, "Output stream closed");
}

async fn watch_exit(
    shared: Arc<Shared>,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    drains: Vec<JoinHandle<()>>,
) {
    let exit = tokio::select! {
        exit = child.status() => exit,
        _ = &mut kill_rx => {
            if let Err(e) = child.kill() {
                tracing::warn!(server_id = %shared.id(), error = %e, "Failed to kill process");
            }
            child.status().await
        }
    };

    // Every line the process wrote is published before its terminal event
    for mut drain in drains {
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut drain).await.is_err() {
            tracing::warn!(server_id = %shared.id(), "Output still open after exit, detaching");
            drain.abort();
        }
    }

    shared.stdin.lock().await.take();
    shared.finish_run(exit);
}
