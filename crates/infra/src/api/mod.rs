//! Resilient request layer for the TableSync backend
//!
//! - [`ApiClient`]: verb methods, path resolution, tenant injection
//! - [`RequestDeduplicator`]: collapses identical in-flight calls
//! - [`SyncContext`]: the process-wide breaker, registry and tenant
//! - [`RequestError`]: closed error taxonomy with UI-facing categories

pub mod client;
pub mod context;
pub mod dedup;
pub mod errors;
pub mod key;

pub use client::{ApiClient, RequestOptions};
pub use context::{SyncContext, SyncContextBuilder};
pub use dedup::{RequestDeduplicator, SharedResponse};
pub use errors::{ErrorCategory, RequestError, RequestResult};
pub use key::RequestKey;
