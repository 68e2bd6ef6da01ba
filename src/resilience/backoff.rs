//! Retry delays between failover attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffKind;

/// Delay before retry number `attempt` (1-based). Attempt 0 never waits.
pub fn retry_delay(kind: BackoffKind, attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    match kind {
        BackoffKind::Linear if attempt == 0 => Duration::ZERO,
        BackoffKind::Linear => Duration::from_millis(base_ms),
        BackoffKind::Exponential => calculate_backoff(attempt, base_ms, max_ms),
    }
}

/// Exponential backoff capped at `max_ms`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
