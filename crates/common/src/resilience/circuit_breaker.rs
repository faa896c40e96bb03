//! Process-wide circuit breaker
//!
//! Counts consecutive failures across every call that reports to it. Once
//! the count reaches the failure threshold the breaker opens and
//! [`CircuitBreaker::should_allow`] rejects calls until the cooldown has
//! elapsed since the last recorded failure. After the cooldown the breaker
//! closes and resets on the next `should_allow` check.
//!
//! There is no half-open state: the first call after the cooldown is an
//! ordinary attempt, not a single trial probe. If it fails, the counter
//! starts again from one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};

/// Consecutive failures that open the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time the breaker stays open after the last failure.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Monotonic time source
///
/// Production code uses [`SystemClock`]; tests drive cooldowns with
/// [`MockClock`] instead of sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed offset, so a test can keep one handle and
/// hand another to the breaker.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Move the clock forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Total time the clock has been advanced
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }
}

//==============================================================================
// Policy and State
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls are dispatched normally
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

/// Threshold and cooldown of a breaker.
///
/// Production code uses [`BreakerPolicy::default`] (5 failures, 30 s); the
/// constructor exists so tests can scale the cooldown down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    failure_threshold: u32,
    cooldown: Duration,
}

impl BreakerPolicy {
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for a zero threshold or cooldown.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> ConfigResult<Self> {
        if failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if cooldown.is_zero() {
            return Err(ConfigError::invalid("cooldown must be greater than 0"));
        }
        Ok(Self { failure_threshold, cooldown })
    }

    /// Consecutive failures that open the breaker
    pub const fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Time the breaker stays open after the last failure
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, cooldown: DEFAULT_COOLDOWN }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    is_open: bool,
}

/// Point-in-time view of the breaker for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Open or closed
    pub state: CircuitState,
    /// Failures since the last success or reset
    pub consecutive_failures: u32,
    /// When the most recent failure was recorded
    pub last_failure_at: Option<Instant>,
    /// Remaining cooldown while open
    pub retry_after: Option<Duration>,
    /// How many times the breaker has opened since creation
    pub times_opened: u64,
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Failure-counting circuit breaker shared by every request
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    state: Mutex<BreakerState>,
    times_opened: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CircuitBreaker")
            .field("policy", &self.policy)
            .field("is_open", &state.is_open)
            .field("consecutive_failures", &state.consecutive_failures)
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerPolicy::default())
    }
}

impl CircuitBreaker {
    /// Create a breaker backed by the system clock
    pub fn new(policy: BreakerPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }

    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock<C: Clock>(policy: BreakerPolicy, clock: C) -> Self {
        Self::with_shared_clock(policy, Arc::new(clock))
    }

    /// Create a breaker around an already shared clock
    pub fn with_shared_clock(policy: BreakerPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            state: Mutex::new(BreakerState::default()),
            times_opened: AtomicU64::new(0),
            clock,
        }
    }

    /// Threshold and cooldown in effect
    pub const fn policy(&self) -> BreakerPolicy {
        self.policy
    }

    /// Decide whether a new call may be dispatched.
    ///
    /// Returns `false` while open and inside the cooldown. Once the cooldown
    /// has elapsed the breaker closes, clears the failure count and returns
    /// `true`.
    pub fn should_allow(&self) -> bool {
        let mut state = self.state.lock();
        if !state.is_open {
            return true;
        }

        let now = self.clock.now();
        let cooled_down = state
            .last_failure_at
            .map_or(true, |failed_at| now.duration_since(failed_at) >= self.policy.cooldown);

        if cooled_down {
            state.is_open = false;
            state.consecutive_failures = 0;
            info!("Circuit breaker cooldown elapsed; closing");
            true
        } else {
            debug!(failures = state.consecutive_failures, "Circuit breaker rejecting call");
            false
        }
    }

    /// Reset the failure count and close the breaker.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.is_open {
            info!("Circuit breaker closed after successful call");
        }
        state.consecutive_failures = 0;
        state.is_open = false;
    }

    /// Count a failure, opening the breaker when the threshold is reached.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(self.clock.now());

        if !state.is_open && state.consecutive_failures >= self.policy.failure_threshold {
            state.is_open = true;
            self.times_opened.fetch_add(1, Ordering::Relaxed);
            warn!(
                failures = state.consecutive_failures,
                cooldown_ms = u64::try_from(self.policy.cooldown.as_millis()).unwrap_or(u64::MAX),
                "Circuit breaker opened"
            );
        }
    }

    /// Remaining cooldown, or `None` when the breaker is closed or the
    /// cooldown has already elapsed.
    pub fn retry_after(&self) -> Option<Duration> {
        let state = self.state.lock();
        self.remaining_cooldown(&state)
    }

    /// Current state, without applying an elapsed cooldown
    pub fn state(&self) -> CircuitState {
        if self.state.lock().is_open {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Whether the breaker is currently open
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Failures since the last success or reset
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Point-in-time view for diagnostics
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        BreakerSnapshot {
            state: if state.is_open { CircuitState::Open } else { CircuitState::Closed },
            consecutive_failures: state.consecutive_failures,
            last_failure_at: state.last_failure_at,
            retry_after: self.remaining_cooldown(&state),
            times_opened: self.times_opened.load(Ordering::Relaxed),
        }
    }

    /// Close the breaker and forget all failures.
    pub fn reset(&self) {
        *self.state.lock() = BreakerState::default();
        info!("Circuit breaker manually reset to closed state");
    }

    fn remaining_cooldown(&self, state: &BreakerState) -> Option<Duration> {
        if !state.is_open {
            return None;
        }
        let failed_at = state.last_failure_at?;
        let elapsed = self.clock.now().duration_since(failed_at);
        self.policy.cooldown.checked_sub(elapsed).filter(|remaining| !remaining.is_zero())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the probe-free breaker: threshold opening, cooldown
    //! reset, success reset and the absence of a half-open trial state.

    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new();
        let policy = BreakerPolicy::new(threshold, Duration::from_millis(cooldown_ms)).unwrap();
        (CircuitBreaker::with_clock(policy, clock.clone()), clock)
    }

    #[test]
    fn test_default_policy_is_five_failures_thirty_seconds() {
        let policy = BreakerPolicy::default();
        assert_eq!(policy.failure_threshold(), 5);
        assert_eq!(policy.cooldown(), Duration::from_secs(30));
    }

    #[test]
    fn test_policy_rejects_zero_values() {
        assert!(BreakerPolicy::new(0, Duration::from_secs(1)).is_err());
        assert!(BreakerPolicy::new(3, Duration::ZERO).is_err());
    }

    #[test]
    fn test_opens_exactly_at_threshold() {
        let (breaker, _clock) = breaker(5, 30_000);

        for _ in 0..4 {
            breaker.record_failure();
            assert!(breaker.should_allow());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.should_allow());
        assert_eq!(breaker.snapshot().times_opened, 1);
    }

    #[test]
    fn test_failures_while_open_do_not_reopen() {
        let (breaker, _clock) = breaker(2, 1_000);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_failure();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.consecutive_failures, 3);
        assert_eq!(snapshot.times_opened, 1);
    }

    #[test]
    fn test_success_resets_count() {
        let (breaker, _clock) = breaker(5, 30_000);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        assert_eq!(breaker.consecutive_failures(), 0);
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_rejects_until_cooldown_then_closes() {
        let (breaker, clock) = breaker(5, 30_000);
        for _ in 0..5 {
            breaker.record_failure();
        }

        clock.advance_millis(29_999);
        assert!(!breaker.should_allow());
        assert_eq!(breaker.retry_after(), Some(Duration::from_millis(1)));

        clock.advance_millis(1);
        assert!(breaker.should_allow());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(breaker.retry_after(), None);
    }

    #[test]
    fn test_no_half_open_probe_after_cooldown() {
        // Classic breakers admit a single trial call after the cooldown.
        // This one closes outright, so any number of calls are admitted.
        let (breaker, clock) = breaker(5, 1_000);
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance_millis(1_000);

        assert!(breaker.should_allow());
        assert!(breaker.should_allow());
        assert!(breaker.should_allow());

        // A single failure afterwards does not reopen it either.
        breaker.record_failure();
        assert!(breaker.should_allow());
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[test]
    fn test_cooldown_measured_from_last_failure() {
        let (breaker, clock) = breaker(2, 1_000);
        breaker.record_failure();
        breaker.record_failure();

        clock.advance_millis(600);
        // A straggling in-flight call fails while open.
        breaker.record_failure();

        clock.advance_millis(600);
        assert!(!breaker.should_allow());

        clock.advance_millis(400);
        assert!(breaker.should_allow());
    }

    #[test]
    fn test_success_closes_open_breaker() {
        let (breaker, _clock) = breaker(1, 30_000);
        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(!breaker.is_open());
        assert!(breaker.should_allow());
    }

    #[test]
    fn test_reset() {
        let (breaker, _clock) = breaker(1, 30_000);
        breaker.record_failure();
        breaker.reset();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.last_failure_at, None);
    }

    #[test]
    fn test_mock_clock_clones_share_time() {
        let clock = MockClock::new();
        let other = clock.clone();
        let before = other.now();

        clock.advance(Duration::from_secs(5));
        assert_eq!(other.now().duration_since(before), Duration::from_secs(5));
        assert_eq!(other.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
