//! Core types for the external file server

use external_file_store::{
    BackendKind, ConsumptionGuarantee, DbConnectionSettings, SandboxScope, DEFAULT_HANDLER_PATH,
    DEFAULT_STORE_NAME,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3005;
pub const DEFAULT_SCAVENGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub backend: BackendKind,
    pub store_name: String,
    /// Parent directory of the file backend's namespace.
    pub store_root: PathBuf,
    pub sandbox: SandboxScope,
    pub empty_on_startup: bool,
    /// Path segment(s) the retrieval route is mounted under, without slashes.
    pub handler_path: String,
    pub scavenge_period: Duration,
    pub scavenge_older_than: Duration,
    pub consumption: ConsumptionGuarantee,
    pub database: DbConnectionSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            backend: BackendKind::Sandboxed,
            store_name: DEFAULT_STORE_NAME.to_string(),
            store_root: PathBuf::from("."),
            sandbox: SandboxScope::default(),
            empty_on_startup: true,
            handler_path: DEFAULT_HANDLER_PATH.trim_matches('/').to_string(),
            scavenge_period: DEFAULT_SCAVENGE_INTERVAL,
            scavenge_older_than: DEFAULT_SCAVENGE_INTERVAL,
            consumption: ConsumptionGuarantee::AtLeastOnce,
            database: DbConnectionSettings::default(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub backend: String,
    pub store: String,
    pub ready: bool,
    /// `None` while the store is not initialized.
    pub artifacts: Option<usize>,
}
