//! Reconnect policy and backoff calculation.
//!
//! - [`ReconnectPolicy`]: bounded attempts with capped exponential delay
//! - [`calculate_backoff_delay`]: deterministic `min(max, base * 2^attempt)`
//! - [`calculate_backoff_delay_with_random`]: the same with symmetric jitter

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds (the chat server's reconnect delay).
pub const DEFAULT_BASE_DELAY_MS: u64 = 5000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default maximum reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default jitter factor (0.0–1.0). Zero keeps delays deterministic.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.0;

/// How the engine retries after a recoverable connection loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, doubled on each further attempt.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
    /// Attempts allowed before the engine enters `Failed`. Zero disables reconnect.
    pub max_attempts: u32,
    /// Jitter factor 0.0–1.0 applied symmetrically around the delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// A fixed delay between a bounded number of attempts.
    #[must_use]
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            base_delay_ms: ms,
            max_delay_ms: ms,
            max_attempts,
            jitter_factor: 0.0,
        }
    }

    /// Whether a retry numbered `attempt` (1-based) is still allowed.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1);
        let ms = if self.jitter_factor > 0.0 {
            calculate_backoff_delay_with_random(
                index,
                self.base_delay_ms,
                self.max_delay_ms,
                self.jitter_factor,
                rand::random::<f64>(),
            )
        } else {
            calculate_backoff_delay(index, self.base_delay_ms, self.max_delay_ms)
        };
        Duration::from_millis(ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Capped exponential backoff: `min(max_delay, base_delay * 2^attempt)`.
///
/// `attempt` is zero-based (0 for the first retry).
#[must_use]
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    base_delay_ms
        .saturating_mul(1u64 << attempt.min(31))
        .min(max_delay_ms)
}

/// Capped exponential backoff with explicit randomness.
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG; it maps to a
/// multiplier in `[1 - jitter, 1 + jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let capped = calculate_backoff_delay(attempt, base_delay_ms, max_delay_ms);
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    ((capped as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
