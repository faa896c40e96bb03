//! Request error taxonomy
//!
//! Every variant is constructed where the failure happens (transport, status
//! check, breaker gate), never reconstructed later from message text.
//! Errors are `Clone` so that deduplicated callers can all receive the same
//! outcome.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::http::ResponseBody;

/// How calling code should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller-initiated abort; stay silent
    Cancelled,
    /// Circuit open; show "temporarily unavailable" and wait for recovery
    Degraded,
    /// Timeout, unreachable server or 5xx; safe to retry
    Transient,
    /// Persistent failure (4xx, invalid request); needs user action
    Fatal,
}

/// Request operation errors
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Transport-level failure (refused connection, DNS, reset)
    #[error("Server unreachable: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Explicit abort; the facade resolves this to "no result"
    #[error("Request cancelled")]
    Cancelled,

    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Http {
        status: StatusCode,
        message: String,
        details: Option<String>,
        body: ResponseBody,
    },

    /// Rejected without I/O because the circuit breaker is open
    #[error("Service temporarily unavailable; retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// The request could not be built (bad URL, header or payload)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A successful body did not match the expected type
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request task ended abnormally
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::CircuitOpen { .. } => ErrorCategory::Degraded,
            Self::Connection(_) | Self::Timeout(_) => ErrorCategory::Transient,
            Self::Http { status, .. } if status.is_server_error() => ErrorCategory::Transient,
            Self::Http { .. } | Self::InvalidRequest(_) | Self::Decode(_) | Self::Internal(_) => {
                ErrorCategory::Fatal
            }
        }
    }

    /// Check if this error may succeed when retried later
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Whether the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the breaker rejected the call
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Whether a dispatched call that ended with this error counts toward
    /// opening the circuit breaker.
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_) | Self::Http { .. })
    }

    /// Suggested wait before trying again, when known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// HTTP status for `Http` errors
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable label suitable for structured logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Http { .. } => "http",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Decode(_) => "decode",
            Self::Internal(_) => "internal",
        }
    }
}

/// Convenience type alias for request operations
pub type RequestResult<T> = Result<T, RequestError>;
