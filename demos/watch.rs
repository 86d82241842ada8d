use mcs_manager::client::{ManagerClient, Multiplexer, MultiplexerOptions};
use mcs_manager::error::Result;
use mcs_manager::events::EventKind;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let base_url =
        std::env::var("MCS_URL").unwrap_or_else(|_| "http://127.0.0.1:8484".to_string());
    let client = ManagerClient::new(&base_url)?;

    let servers = client.list_all().await?;
    if servers.is_empty() {
        warn!("No servers registered at {}", base_url);
        return Ok(());
    }

    let options = MultiplexerOptions {
        on_error: Some(Arc::new(|e| warn!(error = %e, "Event stream interrupted"))),
        on_reconnect: Some(Arc::new(|| info!("Event stream back, state may have changed"))),
        ..MultiplexerOptions::default()
    };
    let multiplexer = Multiplexer::new(&base_url, options)?;

    let mut subscriptions = Vec::new();
    for server in &servers {
        let name = server.config.name.clone();
        info!(server = %name, state = %server.state, "Watching server");

        subscriptions.push(multiplexer.subscribe(
            server.config.id.clone(),
            Arc::new(move |event| match &event.kind {
                EventKind::Log(line) => println!("[{}] {}", name, line.line),
                EventKind::Info(_) => {}
                other => {
                    let state = other.info().map(|info| info.state.to_string());
                    println!(
                        "[{}] {} ({})",
                        name,
                        event.event_type(),
                        state.unwrap_or_default()
                    );
                }
            }),
        ));
    }

    info!("Press Ctrl+C to exit");
    let _ = tokio::signal::ctrl_c().await;

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    multiplexer.shutdown();
    Ok(())
}
