//! Capped exponential backoff arithmetic

use std::time::Duration;

/// Largest exponent applied before the multiplier saturates.
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Compute `min(max, base * 2^exponent)` without overflowing.
///
/// The result is monotonic in `exponent` and never exceeds `max`.
/// `exponent == 0` yields `base` (still capped at `max`).
pub fn exponential_delay(base: Duration, max: Duration, exponent: u32) -> Duration {
    let base_millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);

    // Cap exponent to prevent overflow
    let multiplier = 2_u64.saturating_pow(exponent.min(MAX_BACKOFF_EXPONENT));
    let delay_millis = base_millis.saturating_mul(multiplier).min(max_millis);

    Duration::from_millis(delay_millis)
}
