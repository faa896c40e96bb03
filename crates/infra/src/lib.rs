//! # TableSync Infrastructure
//!
//! The resilient request layer between the restaurant-operations front end
//! and its REST backend.
//!
//! This crate contains:
//! - HTTP request executor with hard timeouts and cooperative cancellation
//! - Client facade with circuit breaking, request coalescing and tenant
//!   routing
//! - Adaptive pollers for keeping views fresh
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Uses configuration and error types from `tablesync-domain`
//! - Uses the circuit breaker and backoff arithmetic from `tablesync-common`
//! - Contains all "impure" code (network I/O, timers, environment)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use api::{
    ApiClient, ErrorCategory, RequestDeduplicator, RequestError, RequestKey, RequestOptions,
    RequestResult, SyncContext,
};
pub use http::{RequestExecutor, ResponseBody, UploadFile, UploadForm};
pub use scheduling::{
    AdaptivePoller, EndpointSource, FnSource, PollSource, PollerPhase, PollerSnapshot,
    SchedulerError,
};
