//! Exponential backoff with jitter for loop restarts.

use std::time::Duration;

use rand::Rng;

/// Longest the supervisor ever waits before restarting the loop body.
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);

/// Restart delay cap for a given polling interval: `min(interval, 60s)`.
pub fn restart_cap(interval: Duration) -> Duration {
    interval.min(MAX_RESTART_DELAY)
}

/// Delay before restart number `attempt` (1-based), doubling from `base` up to `cap`.
///
/// Up to 10% jitter is added but the result never exceeds `cap`.
pub fn restart_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    let capped = base.saturating_mul(factor).min(cap);

    let jitter_range = capped.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    (capped + Duration::from_millis(jitter)).min(cap)
}
