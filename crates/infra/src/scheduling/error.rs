//! Scheduler error types

use std::time::Duration;

use tablesync_domain::TableSyncError;
use thiserror::Error;

use crate::errors::InfraError;

/// Poller lifecycle errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Poller is already running
    #[error("Poller already running")]
    AlreadyRunning,

    /// Poller intervals are inconsistent
    #[error("Invalid poller configuration: {0}")]
    InvalidConfig(String),

    /// Poll task did not finish within the stop timeout
    #[error("Poller did not stop within {duration:?}")]
    Timeout { duration: Duration },

    /// Poll task panicked
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain = match err {
            SchedulerError::AlreadyRunning => TableSyncError::InvalidInput(err.to_string()),
            SchedulerError::InvalidConfig(_) => TableSyncError::Config(err.to_string()),
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                TableSyncError::Internal(err.to_string())
            }
        };
        InfraError(domain)
    }
}

impl From<SchedulerError> for TableSyncError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_maps_to_config_error() {
        let err: TableSyncError = SchedulerError::InvalidConfig("short > normal".into()).into();
        assert!(matches!(err, TableSyncError::Config(msg) if msg.contains("short > normal")));
    }

    #[test]
    fn timeout_maps_to_internal_error() {
        let err: TableSyncError =
            SchedulerError::Timeout { duration: Duration::from_secs(5) }.into();
        assert!(matches!(err, TableSyncError::Internal(_)));
    }
}
