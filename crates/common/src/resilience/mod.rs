//! Resilience patterns for fault tolerance
//!
//! This module provides the **generic** building blocks used by the
//! synchronization client:
//! - **Circuit Breaker**: stops dispatching calls after repeated failures and
//!   resumes after a cooldown (probe-free, no half-open state)
//! - **Backoff**: capped exponential delay arithmetic shared by pollers
//! - **Clock**: time abstraction so cooldowns can be tested without sleeping
//!
//! Nothing here knows about HTTP; `tablesync-infra` wires these primitives
//! into the request layer.

pub mod backoff;
#[cfg(feature = "runtime")]
pub mod circuit_breaker;
pub mod error;

pub use backoff::{exponential_delay, MAX_BACKOFF_EXPONENT};
#[cfg(feature = "runtime")]
pub use circuit_breaker::{
    BreakerPolicy, BreakerSnapshot, CircuitBreaker, CircuitState, Clock, MockClock, SystemClock,
    DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD,
};
pub use error::{ConfigError, ConfigResult};
