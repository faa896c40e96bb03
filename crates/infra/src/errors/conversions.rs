//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use tablesync_domain::TableSyncError;

use crate::api::RequestError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TableSyncError);

impl From<InfraError> for TableSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TableSyncError> for InfraError {
    fn from(value: TableSyncError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → RequestError */
/* -------------------------------------------------------------------------- */

/// Transport errors observed while dispatching or reading a body.
///
/// Timeouts are enforced by the executor, not by reqwest, so a reqwest
/// timeout here only comes from connector-level limits and is reported as a
/// connection failure.
impl From<HttpError> for RequestError {
    fn from(err: HttpError) -> Self {
        if err.is_builder() {
            return RequestError::InvalidRequest(err.to_string());
        }

        if err.is_decode() {
            return RequestError::Decode(err.to_string());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if err.is_connect() {
            return RequestError::Connection(format!("connection failure: {err}"));
        }

        RequestError::Connection(err.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* RequestError → TableSyncError */
/* -------------------------------------------------------------------------- */

impl From<RequestError> for InfraError {
    fn from(err: RequestError) -> Self {
        let message = err.to_string();
        let domain = match err {
            RequestError::Connection(_) | RequestError::Timeout(_) | RequestError::Cancelled => {
                TableSyncError::Network(message)
            }
            RequestError::CircuitOpen { .. } => TableSyncError::Unavailable(message),
            RequestError::Http { .. } => TableSyncError::Backend(message),
            RequestError::InvalidRequest(_) => TableSyncError::InvalidInput(message),
            RequestError::Decode(_) | RequestError::Internal(_) => {
                TableSyncError::Internal(message)
            }
        };
        InfraError(domain)
    }
}

impl From<RequestError> for TableSyncError {
    fn from(err: RequestError) -> Self {
        InfraError::from(err).into()
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
