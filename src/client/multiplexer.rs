//! One shared event-stream connection fanned out to per-server callbacks.
//!
//! A [`Multiplexer`] opens a single `GET /events` connection on first use and
//! routes every received event to the callbacks registered for its server.
//! When the connection fails or ends it waits a fixed delay and reconnects,
//! forever, until [`Multiplexer::shutdown`] is called or the last clone is
//! dropped. Events published while disconnected are lost; the
//! `on_reconnect` hook lets callers resynchronize from the REST API.
//!
//! The manager sends a keep-alive comment on quiet streams. A connection that
//! delivers nothing at all for [`MultiplexerOptions::idle_timeout`] is treated
//! as dead and replaced.

use crate::client::sse::{SseFrame, SseParser};
use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::server::ServerId;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay between a lost connection and the next attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Silence after which an open stream counts as lost. Three times the
/// manager's default keep-alive interval.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Receives the events of one server
pub type EventCallback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;
/// Told about every connection failure
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;
/// Called after each successful reconnection
pub type ReconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Multiplexer behaviour
#[derive(Clone)]
pub struct MultiplexerOptions {
    /// Fixed wait before every reconnection attempt
    pub reconnect_delay: Duration,
    /// Longest gap between received bytes before the stream is dropped
    pub idle_timeout: Duration,
    /// Connection failures, including a stream ended by the server
    pub on_error: Option<ErrorCallback>,
    /// A connection was re-established after a failure
    pub on_reconnect: Option<ReconnectCallback>,
}

impl Default for MultiplexerOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            on_error: None,
            on_reconnect: None,
        }
    }
}

struct Listener {
    callback: EventCallback,
    registrations: usize,
}

fn same_callback(a: &EventCallback, b: &EventCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Listener registry and connection flag, shared with the connection task
#[derive(Default)]
struct Registry {
    listeners: Mutex<HashMap<ServerId, Vec<Listener>>>,
    connected: AtomicBool,
}

impl Registry {
    fn listeners(&self) -> MutexGuard<'_, HashMap<ServerId, Vec<Listener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, server_id: ServerId, callback: EventCallback) {
        let mut listeners = self.listeners();
        let entry = listeners.entry(server_id).or_default();
        match entry.iter_mut().find(|l| same_callback(&l.callback, &callback)) {
            Some(listener) => listener.registrations += 1,
            None => entry.push(Listener {
                callback,
                registrations: 1,
            }),
        }
    }

    fn remove(&self, server_id: &ServerId, callback: &EventCallback) -> bool {
        let mut listeners = self.listeners();
        let Some(entry) = listeners.get_mut(server_id) else {
            return false;
        };
        let Some(pos) = entry.iter().position(|l| same_callback(&l.callback, callback)) else {
            return false;
        };

        entry[pos].registrations -= 1;
        if entry[pos].registrations == 0 {
            entry.remove(pos);
        }
        if entry.is_empty() {
            listeners.remove(server_id);
        }
        true
    }

    /// Invoke every callback of the event's server once. The list is copied
    /// first so callbacks may subscribe or unsubscribe.
    fn dispatch(&self, event: &ServerEvent) {
        let callbacks: Vec<EventCallback> = match self.listeners().get(&event.server_id) {
            Some(entry) => entry.iter().map(|l| l.callback.clone()).collect(),
            None => {
                tracing::trace!(server_id = %event.server_id, "No listeners for event");
                return;
            }
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(
                    server_id = %event.server_id,
                    event_type = event.event_type(),
                    "Event callback panicked"
                );
            }
        }
    }

    fn dispatch_frame(&self, frame: SseFrame) {
        let event = match ServerEvent::from_json(&frame.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(event = ?frame.event, error = %e, "Dropping unparsable event");
                return;
            }
        };
        if let Some(name) = &frame.event {
            if name != event.event_type() {
                tracing::debug!(
                    frame_event = %name,
                    event_type = event.event_type(),
                    "Event name does not match payload type"
                );
            }
        }
        self.dispatch(&event);
    }
}

struct Inner {
    events_url: String,
    http: reqwest::Client,
    options: MultiplexerOptions,
    registry: Arc<Registry>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

/// Shared client for the manager's event stream.
///
/// Cloning is cheap and every clone uses the same connection and registry.
/// Callbacks are keyed by identity: registering the same `Arc` twice for a
/// server still delivers each event to it once, and it stays registered until
/// it has been unsubscribed twice.
///
/// # Examples
///
/// ```no_run
/// use mcs_manager::client::{Multiplexer, MultiplexerOptions};
/// use std::sync::Arc;
///
/// # async fn run() -> mcs_manager::error::Result<()> {
/// let multiplexer = Multiplexer::new("http://127.0.0.1:8484", MultiplexerOptions::default())?;
/// let subscription = multiplexer.subscribe(
///     "survival",
///     Arc::new(|event| println!("{}: {:?}", event.event_type(), event.kind)),
/// );
/// // ...
/// subscription.unsubscribe();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    /// Create a multiplexer for the manager at `base_url`. Nothing connects
    /// until the first subscription.
    pub fn new(base_url: impl AsRef<str>, options: MultiplexerOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                events_url: format!("{}/events", base_url.as_ref().trim_end_matches('/')),
                http,
                options,
                registry: Arc::new(Registry::default()),
                task: Mutex::new(None),
            }),
        })
    }

    /// Register `callback` for the events of `server_id`.
    ///
    /// Starts the shared connection if it is not running. Must be called from
    /// within a Tokio runtime.
    pub fn subscribe(&self, server_id: impl Into<ServerId>, callback: EventCallback) -> Subscription {
        let server_id = server_id.into();
        tracing::debug!(server_id = %server_id, "Adding event listener");
        self.inner.registry.add(server_id.clone(), callback.clone());
        self.ensure_connection();

        Subscription {
            registry: self.inner.registry.clone(),
            server_id,
            callback,
        }
    }

    /// Remove one registration of `callback` for `server_id`. Returns false if
    /// it was not registered. The connection stays open.
    pub fn unsubscribe(&self, server_id: &ServerId, callback: &EventCallback) -> bool {
        self.inner.registry.remove(server_id, callback)
    }

    /// Number of distinct callbacks registered for `server_id`
    pub fn listener_count(&self, server_id: &ServerId) -> usize {
        self.inner
            .registry
            .listeners()
            .get(server_id)
            .map_or(0, Vec::len)
    }

    /// Whether the event stream is currently open
    pub fn is_connected(&self) -> bool {
        self.inner.registry.connected.load(Ordering::Acquire)
    }

    /// Close the connection and forget every listener. A later `subscribe`
    /// starts over.
    pub fn shutdown(&self) {
        if let Some(task) = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.inner.registry.connected.store(false, Ordering::Release);
        self.inner.registry.listeners().clear();
        tracing::debug!("Multiplexer shut down");
    }

    fn ensure_connection(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let connection = Connection {
            events_url: self.inner.events_url.clone(),
            http: self.inner.http.clone(),
            options: self.inner.options.clone(),
            registry: self.inner.registry.clone(),
        };
        *task = Some(tokio::spawn(connection.run()));
    }
}

/// Removes one registration when [`Subscription::unsubscribe`] is called.
///
/// Dropping it without calling `unsubscribe` leaves the callback registered.
#[must_use = "dropping a Subscription keeps the callback registered"]
pub struct Subscription {
    registry: Arc<Registry>,
    server_id: ServerId,
    callback: EventCallback,
}

impl Subscription {
    /// Server this subscription belongs to
    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Remove this registration
    pub fn unsubscribe(self) {
        tracing::debug!(server_id = %self.server_id, "Removing event listener");
        self.registry.remove(&self.server_id, &self.callback);
    }
}

struct Connection {
    events_url: String,
    http: reqwest::Client,
    options: MultiplexerOptions,
    registry: Arc<Registry>,
}

impl Connection {
    async fn run(self) {
        let mut connected_before = false;

        loop {
            let error = match self.open().await {
                Ok(response) => {
                    self.registry.connected.store(true, Ordering::Release);
                    if connected_before {
                        tracing::info!(url = %self.events_url, "Event stream reconnected");
                        if let Some(on_reconnect) = &self.options.on_reconnect {
                            on_reconnect();
                        }
                    } else {
                        tracing::info!(url = %self.events_url, "Event stream connected");
                    }
                    connected_before = true;

                    let result = self.read(response).await;
                    self.registry.connected.store(false, Ordering::Release);
                    match result {
                        Ok(()) => Error::Transport("event stream closed by server".to_string()),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            tracing::warn!(
                error = %error,
                retry_in_ms = self.options.reconnect_delay.as_millis() as u64,
                "Event stream lost"
            );
            if let Some(on_error) = &self.options.on_error {
                on_error(&error);
            }

            tokio::time::sleep(self.options.reconnect_delay).await;
        }
    }

    async fn open(&self) -> Result<reqwest::Response> {
        self.http
            .get(&self.events_url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Transport(format!("Failed to open event stream: {}", e)))
    }

    async fn read(&self, response: reqwest::Response) -> Result<()> {
        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        loop {
            let next = tokio::time::timeout(self.options.idle_timeout, body.next())
                .await
                .map_err(|_| {
                    Error::Transport(format!(
                        "event stream idle for {}ms",
                        self.options.idle_timeout.as_millis()
                    ))
                })?;
            let Some(chunk) = next else {
                return Ok(());
            };
            let chunk = chunk.map_err(|e| Error::Transport(format!("Event stream failed: {}", e)))?;
            for frame in parser.push(&chunk) {
                self.registry.dispatch_frame(frame);
            }
        }
    }
}
