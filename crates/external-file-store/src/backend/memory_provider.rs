//! In-process database provider
//!
//! Behaves like a database with one table per store name. Useful for tests
//! and for running the database backend without a server.

use super::DbStoreProvider;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::types::Artifact;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

struct Row {
    artifact: Artifact,
    created_at: DateTime<Utc>,
}

type Table = HashMap<String, Row>;

pub struct MemoryDbProvider {
    tables: RwLock<HashMap<String, Table>>,
    clock: Arc<dyn Clock>,
}

impl MemoryDbProvider {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn has_table(&self, store: &str) -> bool {
        self.tables.read().await.contains_key(store)
    }
}

impl Default for MemoryDbProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_table(store: &str) -> StoreError {
    StoreError::Provider(format!("table '{}' does not exist", store))
}

#[async_trait]
impl DbStoreProvider for MemoryDbProvider {
    async fn init(&self, store: &str) -> Result<()> {
        self.tables
            .write()
            .await
            .entry(store.to_string())
            .or_default();
        Ok(())
    }

    async fn add_or_update(&self, store: &str, id: &str, artifact: &Artifact) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(store).ok_or_else(|| missing_table(store))?;
        table.insert(
            id.to_string(),
            Row {
                artifact: artifact.clone(),
                created_at: self.clock.now(),
            },
        );
        Ok(())
    }

    async fn get(&self, store: &str, id: &str) -> Result<Option<Artifact>> {
        let tables = self.tables.read().await;
        let table = tables.get(store).ok_or_else(|| missing_table(store))?;
        Ok(table.get(id).map(|row| row.artifact.clone()))
    }

    async fn get_all(&self, store: &str) -> Result<Vec<Artifact>> {
        let tables = self.tables.read().await;
        let table = tables.get(store).ok_or_else(|| missing_table(store))?;
        Ok(table.values().map(|row| row.artifact.clone()).collect())
    }

    async fn delete(&self, store: &str, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(store).ok_or_else(|| missing_table(store))?;
        table.remove(id);
        Ok(())
    }

    async fn delete_store(&self, store: &str) -> Result<()> {
        self.tables.write().await.remove(store);
        Ok(())
    }

    async fn scavenge(&self, store: &str, threshold: Duration) -> Result<usize> {
        let now = self.clock.now();
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);

        let mut tables = self.tables.write().await;
        let table = tables.get_mut(store).ok_or_else(|| missing_table(store))?;
        let before = table.len();
        table.retain(|_, row| now.signed_duration_since(row.created_at) <= threshold);
        let removed = before - table.len();

        debug!(table = %store, removed, "Scavenged rows");
        Ok(removed)
    }
}
