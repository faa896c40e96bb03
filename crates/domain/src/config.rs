//! Configuration structures for the synchronization client
//!
//! Durations are stored as milliseconds so the structures deserialize
//! directly from environment variables, TOML and JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT_MS, POLLER_STOP_TIMEOUT_MS,
    POLL_BASE_INTERVAL_MS, POLL_MAX_INTERVAL_MS, POLL_NORMAL_INTERVAL_MS, POLL_SHORT_INTERVAL_MS,
};
use crate::errors::{Result, TableSyncError};
use crate::impl_domain_status_conversions;

/// How a request that exceeds its timeout is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// The aborted call resolves as cancelled and is not counted as a
    /// circuit breaker failure.
    #[default]
    Cancel,
    /// The aborted call surfaces a retryable timeout error and counts as a
    /// circuit breaker failure.
    Fail,
}

impl_domain_status_conversions!(TimeoutPolicy {
    Cancel => "cancel",
    Fail => "fail",
});

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl_domain_status_conversions!(LogFormat {
    Pretty => "pretty",
    Json => "json",
});

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST backend settings
    pub api: ApiConfig,
    /// Adaptive poller intervals
    pub poller: PollerConfig,
    /// Tracing subscriber settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate every section.
    ///
    /// # Errors
    /// Returns `TableSyncError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.poller.validate()
    }
}

/// REST backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every relative path is resolved against
    pub base_url: String,
    /// Default per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Tenant identifier sent as `X-Tenant-Id` when present
    pub tenant_id: Option<String>,
    /// How timed out requests are reported
    pub timeout_policy: TimeoutPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            tenant_id: None,
            timeout_policy: TimeoutPolicy::default(),
        }
    }
}

impl ApiConfig {
    /// Default per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// # Errors
    /// Returns `TableSyncError::Config` for an empty base URL or zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(TableSyncError::Config("api.base_url must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(TableSyncError::Config(
                "api.timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Adaptive poller intervals
///
/// `base_interval` seeds the failure backoff, `short_interval` is used while
/// the fetched data is urgent and `normal_interval` otherwise. No period
/// ever exceeds `max_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seed of the failure backoff
    pub base_interval_ms: u64,
    /// Period while data is urgent
    pub short_interval_ms: u64,
    /// Period while data is ordinary
    pub normal_interval_ms: u64,
    /// Upper bound of every period
    pub max_interval_ms: u64,
    /// How long `shutdown` waits for the poll task to finish
    pub stop_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: POLL_BASE_INTERVAL_MS,
            short_interval_ms: POLL_SHORT_INTERVAL_MS,
            normal_interval_ms: POLL_NORMAL_INTERVAL_MS,
            max_interval_ms: POLL_MAX_INTERVAL_MS,
            stop_timeout_ms: POLLER_STOP_TIMEOUT_MS,
        }
    }
}

impl PollerConfig {
    /// Seed of the failure backoff
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// Period while data is urgent
    pub fn short_interval(&self) -> Duration {
        Duration::from_millis(self.short_interval_ms)
    }

    /// Period while data is ordinary
    pub fn normal_interval(&self) -> Duration {
        Duration::from_millis(self.normal_interval_ms)
    }

    /// Upper bound of every period
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// How long `shutdown` waits for the poll task
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// # Errors
    /// Returns `TableSyncError::Config` when an interval is zero or the
    /// intervals are not ordered `short <= normal <= max` and `base <= max`.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("base_interval_ms", self.base_interval_ms),
            ("short_interval_ms", self.short_interval_ms),
            ("normal_interval_ms", self.normal_interval_ms),
            ("max_interval_ms", self.max_interval_ms),
        ];
        if let Some((name, _)) = named.iter().find(|(_, value)| *value == 0) {
            return Err(TableSyncError::Config(format!("poller.{name} must be greater than 0")));
        }
        if self.base_interval_ms > self.max_interval_ms {
            return Err(TableSyncError::Config(format!(
                "poller.base_interval_ms ({}) cannot exceed max_interval_ms ({})",
                self.base_interval_ms, self.max_interval_ms
            )));
        }
        if self.short_interval_ms > self.normal_interval_ms {
            return Err(TableSyncError::Config(format!(
                "poller.short_interval_ms ({}) cannot exceed normal_interval_ms ({})",
                self.short_interval_ms, self.normal_interval_ms
            )));
        }
        if self.normal_interval_ms > self.max_interval_ms {
            return Err(TableSyncError::Config(format!(
                "poller.normal_interval_ms ({}) cannot exceed max_interval_ms ({})",
                self.normal_interval_ms, self.max_interval_ms
            )));
        }
        Ok(())
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub filter: String,
    /// Pretty or JSON output
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: DEFAULT_LOG_FILTER.to_string(), format: LogFormat::default() }
    }
}
