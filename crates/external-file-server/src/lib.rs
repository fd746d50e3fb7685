//! External File Server Library
//!
//! HTTP binding, configuration and background tasks for serving artifacts
//! from an `external-file-store` store.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod server;
pub mod types;

pub use bootstrap::{open_store, spawn_scavenger};
pub use config::{load_config, load_config_from};
pub use error::{Result, ServerError};
pub use server::{create_router, start_server, ServerState, SharedState};
pub use types::*;
