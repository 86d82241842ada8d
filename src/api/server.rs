//! HTTP server wiring: binds the listener and runs the Actix app.

use crate::api::handlers::{self, ApiState};
use crate::config::{ApiConfig, DEFAULT_WORKERS};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::server::Supervisor;

use actix_cors::Cors;
use actix_web::{App, HttpServer, dev::ServerHandle, middleware, web::Data};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Handle to a running HTTP API
#[derive(Clone)]
pub struct ApiHandle {
    server: ServerHandle,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    addrs: Vec<SocketAddr>,
}

impl ApiHandle {
    /// Addresses the API is listening on
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// First listening address, useful when bound to port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addrs.first().copied()
    }

    /// Stop accepting connections and wait for the server task to end
    pub async fn shutdown(&self) -> Result<()> {
        self.server.stop(true).await;

        let mut task = self.task.lock().await;
        if let Some(task) = task.take() {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Err(e)) => tracing::warn!(error = %e, "Error while joining API task"),
                Err(_) => tracing::warn!("Timeout waiting for API task to finish"),
                Ok(Ok(())) => {}
            }
        }

        tracing::info!("HTTP API shut down");
        Ok(())
    }
}

/// The manager's HTTP API
pub struct HttpApi;

impl HttpApi {
    /// Bind and start serving in a background task
    ///
    /// # Arguments
    ///
    /// * `supervisor` - Registry the routes operate on
    /// * `bus` - Bus streamed to `/events` subscribers
    /// * `config` - Bind address, workers and keep-alive interval
    pub async fn start(
        supervisor: Arc<Supervisor>,
        bus: EventBus,
        config: &ApiConfig,
    ) -> Result<ApiHandle> {
        let addr_str = format!("{}:{}", config.address, config.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::Other(format!("Failed to parse socket address: {}", e)))?
            .next()
            .ok_or_else(|| Error::Other(format!("Could not parse socket address: {}", addr_str)))?;

        let state = Data::new(ApiState {
            supervisor,
            bus,
            keep_alive: Duration::from_secs(config.keep_alive_secs.max(1)),
        });

        let server_builder = HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(middleware::Logger::default())
                .wrap(cors)
                .app_data(state.clone())
                .configure(handlers::configure)
        });

        let workers = config.workers.unwrap_or(DEFAULT_WORKERS);
        tracing::info!(address = %addr_str, workers, "Starting HTTP API");

        let server_builder = server_builder
            .workers(workers)
            .bind(addr)
            .map_err(|e| Error::Other(format!("Failed to bind server: {}", e)))?;
        let addrs = server_builder.addrs();
        let server = server_builder.run();
        let server_handle = server.handle();

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        });

        tracing::info!(addrs = ?addrs, "HTTP API started");
        Ok(ApiHandle {
            server: server_handle,
            task: Arc::new(Mutex::new(Some(task))),
            addrs,
        })
    }
}
