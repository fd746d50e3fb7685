//! Store construction and the periodic scavenger task

use crate::error::Result;
use crate::types::ServerConfig;
use external_file_db::PgStoreProvider;
use external_file_store::{BackendKind, FileBackend, SandboxedBackend, Scavenger, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Build the configured backend and wrap it in a store. The store is not
/// initialized yet.
pub async fn open_store(config: &ServerConfig) -> Result<Store> {
    let store = match config.backend {
        BackendKind::File => Store::new(FileBackend::new(&config.store_root, &config.store_name)),
        BackendKind::Sandboxed => Store::new(SandboxedBackend::new(
            config.sandbox.clone(),
            &config.store_name,
        )?),
        BackendKind::Database => {
            let provider = PgStoreProvider::from_settings(&config.database).await?;
            Store::database(&config.store_name, Arc::new(provider))
        }
    };

    info!(backend = %store.kind(), store = %store.store_name(), "Opened store");
    Ok(store)
}

/// Sweep `store` every `period`, removing artifacts older than `threshold`.
///
/// The first sweep happens one period after start. A failed sweep is logged
/// and the next tick tries again.
pub fn spawn_scavenger(store: Store, period: Duration, threshold: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    info!(
        period_secs = period.as_secs(),
        threshold_secs = threshold.as_secs(),
        "Starting scavenger"
    );

    tokio::spawn(async move {
        let scavenger = Scavenger::new(threshold);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = scavenger.run(&store).await {
                error!(store = %store.store_name(), error = %e, "Scavenge failed");
            }
        }
    })
}
