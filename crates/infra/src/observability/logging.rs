//! Tracing subscriber setup.

use tablesync_domain::{LogFormat, LoggingConfig, Result, TableSyncError};
use tracing_subscriber::EnvFilter;

/// Build the event filter.
///
/// `RUST_LOG`, when set and non-blank, wins over the configured directive.
///
/// # Errors
/// Returns `TableSyncError::Config` if the directive cannot be parsed.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directive) if !directive.trim().is_empty() => parse_filter(&directive),
        _ => parse_filter(&config.filter),
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| TableSyncError::Config(format!("Invalid log directive '{directive}': {e}")))
}

/// Install the global `fmt` subscriber.
///
/// Returns `Ok(false)` when a global subscriber was already installed (for
/// example by the host application), leaving it untouched.
///
/// # Errors
/// Returns `TableSyncError::Config` if the filter directive is invalid.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = build_filter(config)?;

    let installed = match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
        }
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(filter = %config.filter, format = %config.format, "tracing initialized");
    }
    Ok(installed.is_ok())
}
