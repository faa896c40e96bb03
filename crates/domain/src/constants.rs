//! Application constants
//!
//! Centralized location for the request and polling policy used by the
//! synchronization client.

// Request policy
/// Backend used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
/// Per-call timeout when the caller sets none
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;
/// Header carrying the tenant identifier
pub const TENANT_HEADER: &str = "X-Tenant-Id";

// Adaptive polling (inventory auto-refresh)
/// Seed of the failure backoff
pub const POLL_BASE_INTERVAL_MS: u64 = 5_000;
/// Period while polled data is urgent
pub const POLL_SHORT_INTERVAL_MS: u64 = 2_000;
/// Period while polled data is ordinary
pub const POLL_NORMAL_INTERVAL_MS: u64 = 5_000;
/// Upper bound of every poll period
pub const POLL_MAX_INTERVAL_MS: u64 = 60_000;
/// How long `shutdown` waits for a poll task
pub const POLLER_STOP_TIMEOUT_MS: u64 = 5_000;

// Logging
/// `EnvFilter` directive when none is configured
pub const DEFAULT_LOG_FILTER: &str = "info";

// Environment variables
/// Backend base URL (required)
pub const ENV_API_BASE_URL: &str = "TABLESYNC_API_BASE_URL";
/// Fallback tenant identifier
pub const ENV_TENANT_ID: &str = "TABLESYNC_TENANT_ID";
/// Default per-call timeout
pub const ENV_REQUEST_TIMEOUT_MS: &str = "TABLESYNC_REQUEST_TIMEOUT_MS";
/// `cancel` or `fail`
pub const ENV_TIMEOUT_POLICY: &str = "TABLESYNC_TIMEOUT_POLICY";
/// Poller backoff seed
pub const ENV_POLL_BASE_MS: &str = "TABLESYNC_POLL_BASE_MS";
/// Poller urgent period
pub const ENV_POLL_SHORT_MS: &str = "TABLESYNC_POLL_SHORT_MS";
/// Poller ordinary period
pub const ENV_POLL_NORMAL_MS: &str = "TABLESYNC_POLL_NORMAL_MS";
/// Poller period cap
pub const ENV_POLL_MAX_MS: &str = "TABLESYNC_POLL_MAX_MS";
/// Tracing filter directive
pub const ENV_LOG_FILTER: &str = "TABLESYNC_LOG_FILTER";
/// `pretty` or `json`
pub const ENV_LOG_FORMAT: &str = "TABLESYNC_LOG_FORMAT";
