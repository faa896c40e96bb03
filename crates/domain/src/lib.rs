//! # TableSync Domain
//!
//! Domain types shared by the synchronization client crates.
//!
//! This crate contains:
//! - Domain error type and Result alias
//! - Configuration structures (API, poller, logging)
//! - Policy constants (timeouts, poll intervals, header names)
//!
//! ## Architecture
//! - No dependencies on other TableSync crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
