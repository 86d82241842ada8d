use crate::api::{CommandRequest, CreateServerRequest};
use crate::error::{Error, Result};
use crate::server::{ServerId, ServerInfo};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Lifecycle commands may block for the readiness grace period plus a stop timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

/// Client for the manager's REST routes.
///
/// Mirrors the supervisor's commands one to one; errors reported by the
/// manager come back as the matching [`Error`] variant, chosen by the `kind`
/// in the error body and falling back to the status code.
///
/// # Examples
///
/// ```no_run
/// use mcs_manager::client::ManagerClient;
///
/// # async fn run() -> mcs_manager::error::Result<()> {
/// let client = ManagerClient::new("http://127.0.0.1:8484")?;
/// for server in client.list_all().await? {
///     println!("{} ({})", server.config.name, server.state);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ManagerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ManagerClient {
    /// Create a client for the manager at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, http))
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    /// Base URL of the manager
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn server_url(&self, id: &ServerId, action: &str) -> String {
        self.url(&format!("/servers/{}{}", id, action))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let (kind, message) = match response.json::<ErrorBody>().await {
            Ok(body) => (body.kind, body.error),
            Err(_) => (None, status.to_string()),
        };
        if let Some(error) = kind.and_then(|kind| Error::from_kind(&kind, message.clone())) {
            return Err(error);
        }
        Err(match status {
            StatusCode::NOT_FOUND => Error::ServerNotFound(message),
            StatusCode::CONFLICT => Error::Conflict(message),
            _ => Error::Transport(format!("{}: {}", status, message)),
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid response body: {}", e)))
    }

    fn transport(e: reqwest::Error) -> Error {
        Error::Transport(e.to_string())
    }

    /// Every server, sorted by name
    pub async fn list_all(&self) -> Result<Vec<ServerInfo>> {
        let response = self
            .http
            .get(self.url("/servers"))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::json(response).await
    }

    /// One server
    pub async fn get_by_id(&self, id: &ServerId) -> Result<ServerInfo> {
        let response = self
            .http
            .get(self.server_url(id, ""))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::json(response).await
    }

    /// Register a new server
    pub async fn create(&self, request: &CreateServerRequest) -> Result<ServerInfo> {
        let response = self
            .http
            .post(self.url("/servers"))
            .json(request)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::json(response).await
    }

    async fn lifecycle(&self, id: &ServerId, action: &str) -> Result<ServerInfo> {
        tracing::debug!(server_id = %id, action, "Sending lifecycle command");
        let response = self
            .http
            .post(self.server_url(id, action))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::json(response).await
    }

    /// Launch a server and wait until it runs
    pub async fn start(&self, id: &ServerId) -> Result<ServerInfo> {
        self.lifecycle(id, "/start").await
    }

    /// Stop a server; `graceful = false` kills it
    pub async fn stop(&self, id: &ServerId, graceful: bool) -> Result<ServerInfo> {
        let action = if graceful { "/stop" } else { "/stop?force=true" };
        self.lifecycle(id, action).await
    }

    /// Stop (if running) and start a server
    pub async fn restart(&self, id: &ServerId) -> Result<ServerInfo> {
        self.lifecycle(id, "/restart").await
    }

    /// Remove a stopped server
    pub async fn delete(&self, id: &ServerId) -> Result<()> {
        let response = self
            .http
            .delete(self.server_url(id, ""))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }

    /// Write a console command to a running server
    pub async fn send_command(&self, id: &ServerId, command: &str) -> Result<()> {
        let response = self
            .http
            .post(self.server_url(id, "/cmd"))
            .json(&CommandRequest {
                command: command.to_string(),
            })
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }

    /// Recent console output; empty when nothing was logged yet
    pub async fn logs(&self, id: &ServerId) -> Result<String> {
        let response = self
            .http
            .get(self.server_url(id, "/logs"))
            .send()
            .await
            .map_err(Self::transport)?;
        let response = Self::check(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(String::new());
        }
        response.text().await.map_err(Self::transport)
    }
}
