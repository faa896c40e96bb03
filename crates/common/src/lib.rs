//! Modular common utilities shared across TableSync crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: backoff arithmetic and configuration errors
//! - `observability`: tracing of state transitions
//! - `runtime`: shared resilience state (clock, circuit breaker)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use resilience::{exponential_delay, ConfigError, ConfigResult};
#[cfg(feature = "runtime")]
pub use resilience::{
    BreakerPolicy, BreakerSnapshot, CircuitBreaker, CircuitState, Clock, MockClock, SystemClock,
};
