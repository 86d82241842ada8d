use anyhow::Context;
use mcs_manager::{Config, ServerManager};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // MCS_CONFIG points at a JSON or YAML file; defaults apply without one
    let config = match std::env::var("MCS_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration");
            Config::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        Err(_) => Config::default(),
    };

    let mut manager = ServerManager::new(config)
        .await
        .context("starting server manager")?;
    let bound = manager
        .start_api()
        .await
        .context("starting HTTP API")?
        .local_addr();

    let api = &manager.config().api;
    let host = &api.address;
    let port = bound.map_or(api.port, |addr| addr.port());

    info!("Managing servers under {}", manager.config().root.display());
    info!("Available HTTP endpoints:");
    info!(" - Event stream:      GET    http://{}:{}/events", host, port);
    info!(" - List servers:      GET    http://{}:{}/servers", host, port);
    info!(" - Create a server:   POST   http://{}:{}/servers", host, port);
    info!(" - Start a server:    POST   http://{}:{}/servers/ID/start", host, port);
    info!(" - Stop a server:     POST   http://{}:{}/servers/ID/stop", host, port);
    info!(" - Console command:   POST   http://{}:{}/servers/ID/cmd", host, port);
    info!(" - Recent output:     GET    http://{}:{}/servers/ID/logs", host, port);
    info!("");
    info!("Watch events with: curl -N http://{}:{}/events", host, port);
    info!("Press Ctrl+C to exit");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
    }

    info!("Stopping all servers");
    manager.shutdown().await?;
    Ok(())
}
