//! Observability infrastructure
//!
//! Structured logging is done with `tracing` throughout the crate; this
//! module installs the process-wide subscriber.

pub mod logging;

pub use logging::{build_filter, init_tracing};
