//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for TableSync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TableSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for TableSync operations
pub type Result<T> = std::result::Result<T, TableSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_tagged_message() {
        let err = TableSyncError::Unavailable("circuit open".to_string());
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["type"], "Unavailable");
        assert_eq!(json["message"], "circuit open");
    }

    #[test]
    fn display_includes_category() {
        let err = TableSyncError::Config("missing base url".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing base url");
    }
}
