//! Environment configuration

use crate::error::{Result, ServerError};
use crate::types::ServerConfig;
use external_file_store::time_span::parse_time_span;
use external_file_store::{BackendKind, ConsumptionGuarantee, DbConnectionSettings, SandboxScope};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Load configuration from the process environment.
pub fn load_config() -> Result<ServerConfig> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Load configuration through `lookup`, which maps a variable name to its value.
pub fn load_config_from<F>(lookup: F) -> Result<ServerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ServerConfig::default();
    let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let port = var("PORT")
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let backend = match var("STORE_BACKEND") {
        Some(s) => s.parse::<BackendKind>()?,
        None => defaults.backend,
    };

    let store_name = var("STORE_NAME").unwrap_or(defaults.store_name);

    let store_root = var("STORE_ROOT")
        .map(PathBuf::from)
        .unwrap_or(defaults.store_root);

    let sandbox = SandboxScope::new(
        var("SANDBOX_APPLICATION").unwrap_or(defaults.sandbox.application),
        var("SANDBOX_DOMAIN").unwrap_or(defaults.sandbox.domain),
    );

    let empty_on_startup = var("EMPTY_ON_STARTUP")
        .and_then(|s| parse_flag(&s))
        .unwrap_or(defaults.empty_on_startup);

    let handler_path = var("HANDLER_PATH")
        .map(|s| s.trim_matches(|c| c == '/' || c == '\\').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(defaults.handler_path);

    let scavenge_period = duration_var(&var, "SCAVENGE_PERIOD", defaults.scavenge_period);
    let scavenge_older_than = duration_var(
        &var,
        "SCAVENGE_ITEMS_OLDER_THAN",
        defaults.scavenge_older_than,
    );

    let consumption = match var("CONSUMPTION_GUARANTEE") {
        Some(s) => s
            .parse::<ConsumptionGuarantee>()
            .map_err(ServerError::Config)?,
        None => defaults.consumption,
    };

    let database = DbConnectionSettings {
        connection_string: var("DB_CONNECTION_STRING"),
        connection_string_name: var("DB_CONNECTION_STRING_NAME"),
        db_name: var("DB_NAME"),
    };

    Ok(ServerConfig {
        port,
        backend,
        store_name,
        store_root,
        sandbox,
        empty_on_startup,
        handler_path,
        scavenge_period,
        scavenge_older_than,
        consumption,
        database,
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// Unparseable or zero values fall back to the default.
fn duration_var<F>(var: &F, name: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(name) else {
        return default;
    };
    match parse_time_span(&raw) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) => {
            warn!(variable = name, "Zero duration ignored, using default");
            default
        }
        Err(e) => {
            warn!(variable = name, error = %e, "Invalid duration ignored, using default");
            default
        }
    }
}
