//! External File Server
//!
//! Serves generated artifacts from the configured store, consumes single-use
//! ones on retrieval and sweeps out anything past its age threshold.

use external_file_server::{
    load_config, open_store, spawn_scavenger, start_server, Result, ServerError, ServerState,
    SharedState,
};
use external_file_store::time_span::format_time_span;
use external_file_store::Protocol;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("external_file_server=info".parse()?)
        .add_directive("external_file_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting External File Server...");

    // Load configuration from environment
    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Backend: {} ({})", config.backend, config.store_name);
    info!("Handler path: /{}/", config.handler_path);
    info!("Consumption guarantee: {}", config.consumption);
    info!(
        "Scavenge every {} for items older than {}",
        format_time_span(config.scavenge_period),
        format_time_span(config.scavenge_older_than)
    );

    let store = open_store(&config).await?;
    store.init_for_startup(config.empty_on_startup).await?;

    spawn_scavenger(
        store.clone(),
        config.scavenge_period,
        config.scavenge_older_than,
    );

    let protocol = Protocol::new(config.consumption);
    let state: SharedState = Arc::new(ServerState::new(store, protocol, config.handler_path));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ServerError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
