//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If the base URL is not set there, falls back to loading from file;
//!    a set but malformed variable is an error, not a fallback
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TABLESYNC_API_BASE_URL`: Backend base URL (required)
//! - `TABLESYNC_TENANT_ID`: Fallback tenant sent as `X-Tenant-Id`
//! - `TABLESYNC_REQUEST_TIMEOUT_MS`: Default per-call timeout
//! - `TABLESYNC_TIMEOUT_POLICY`: `cancel` or `fail`
//! - `TABLESYNC_POLL_BASE_MS`, `TABLESYNC_POLL_SHORT_MS`,
//!   `TABLESYNC_POLL_NORMAL_MS`, `TABLESYNC_POLL_MAX_MS`: Poller intervals
//! - `TABLESYNC_LOG_FILTER`: Tracing filter directive
//! - `TABLESYNC_LOG_FORMAT`: `pretty` or `json`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./tablesync.toml` or `./tablesync.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tablesync_domain::constants::{
    ENV_API_BASE_URL, ENV_LOG_FILTER, ENV_LOG_FORMAT, ENV_POLL_BASE_MS, ENV_POLL_MAX_MS,
    ENV_POLL_NORMAL_MS, ENV_POLL_SHORT_MS, ENV_REQUEST_TIMEOUT_MS, ENV_TENANT_ID,
    ENV_TIMEOUT_POLICY,
};
use tablesync_domain::{Config, LogFormat, Result, TableSyncError, TimeoutPolicy};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["tablesync.toml", "tablesync.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// Uses environment variables when the base URL is set there. Only when it
/// is missing does the loader fall back to a config file. The result is
/// validated.
///
/// # Errors
/// Returns `TableSyncError::Config` if:
/// - An environment variable is set but malformed
/// - No base URL is in the environment and no config file can be loaded
/// - File format is invalid
/// - A value is out of range
pub fn load() -> Result<Config> {
    let config = if env_opt(ENV_API_BASE_URL).is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        config
    } else {
        tracing::debug!(var = ENV_API_BASE_URL, "Base URL not in environment, trying file");
        load_from_file(None)?
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// Only `TABLESYNC_API_BASE_URL` is required; every other setting falls
/// back to its default.
///
/// # Errors
/// Returns `TableSyncError::Config` if the base URL is missing or a value
/// cannot be parsed.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.api.base_url = env_var(ENV_API_BASE_URL)?;
    config.api.tenant_id = env_opt(ENV_TENANT_ID).filter(|t| !t.trim().is_empty());
    if let Some(timeout_ms) = env_parse::<u64>(ENV_REQUEST_TIMEOUT_MS)? {
        config.api.timeout_ms = timeout_ms;
    }
    if let Some(policy) = env_parse::<TimeoutPolicy>(ENV_TIMEOUT_POLICY)? {
        config.api.timeout_policy = policy;
    }

    let poller = &mut config.poller;
    for (key, field) in [
        (ENV_POLL_BASE_MS, &mut poller.base_interval_ms),
        (ENV_POLL_SHORT_MS, &mut poller.short_interval_ms),
        (ENV_POLL_NORMAL_MS, &mut poller.normal_interval_ms),
        (ENV_POLL_MAX_MS, &mut poller.max_interval_ms),
    ] {
        if let Some(value) = env_parse::<u64>(key)? {
            *field = value;
        }
    }

    if let Some(filter) = env_opt(ENV_LOG_FILTER) {
        config.logging.filter = filter;
    }
    if let Some(format) = env_parse::<LogFormat>(ENV_LOG_FORMAT)? {
        config.logging.format = format;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Missing sections and fields take their defaults.
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`probe_config_paths`].
///
/// # Errors
/// Returns `TableSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TableSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TableSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TableSyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `TableSyncError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TableSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TableSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TableSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, its parent and grandparent,
/// then the same three levels relative to the executable.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots.iter().find_map(|root| probe_from(root))
}

/// First config file under `root`, its parent or its grandparent.
fn probe_from(root: &Path) -> Option<PathBuf> {
    root.ancestors()
        .take(3)
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Get required environment variable
///
/// # Errors
/// Returns `TableSyncError::Config` if the variable is not set or blank.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        TableSyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Optional environment variable; blank values count as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an optional environment variable
///
/// # Errors
/// Returns `TableSyncError::Config` if the variable is set but invalid.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| TableSyncError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}
