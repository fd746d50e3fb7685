//! Age-based eviction

use crate::error::Result;
use crate::store::Store;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Stateless sweep deleting artifacts older than a threshold.
///
/// Scheduling is the caller's job. A sweep may run concurrently with ordinary
/// traffic and with other sweeps; keys that disappear underneath it are
/// skipped rather than reported.
#[derive(Debug, Clone, Copy)]
pub struct Scavenger {
    threshold: Duration,
}

impl Scavenger {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Run one sweep, returning how many artifacts were removed.
    pub async fn run(&self, store: &Store) -> Result<usize> {
        let started = Instant::now();
        let removed = store.scavenge(self.threshold).await?;

        if removed > 0 {
            info!(
                store = %store.store_name(),
                removed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Scavenged expired artifacts"
            );
        } else {
            debug!(store = %store.store_name(), "Nothing to scavenge");
        }
        Ok(removed)
    }
}
