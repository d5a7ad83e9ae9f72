//! Retry backoff policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maps the number of attempts made to the delay before the next one.
///
/// Serialized as `{"type": "fixed" | "exponential", "delay": <ms>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay before every retry.
    Fixed {
        /// Delay in milliseconds.
        #[serde(rename = "delay")]
        delay_ms: u64,
    },
    /// `base * 2^(n-1)` before the nth retry.
    Exponential {
        /// Base delay in milliseconds.
        #[serde(rename = "delay")]
        base_delay_ms: u64,
    },
}

impl BackoffPolicy {
    /// Fixed delay policy.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: duration_ms(delay),
        }
    }

    /// Exponential policy doubling from `base`.
    #[must_use]
    pub const fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base_delay_ms: duration_ms(base),
        }
    }

    /// Configured delay: the fixed delay or the exponential base.
    #[must_use]
    pub const fn base_delay_ms(&self) -> u64 {
        match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential { base_delay_ms } => base_delay_ms,
        }
    }

    /// Delay in milliseconds before the retry that follows attempt number
    /// `attempts` (1-based), capped at `max_delay_ms`.
    ///
    /// `attempts == 0` is treated as the first attempt.
    #[must_use]
    pub fn delay_ms(&self, attempts: u32, max_delay_ms: u64) -> u64 {
        let raw = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential { base_delay_ms } => {
                let exponent = attempts.saturating_sub(1).min(63);
                base_delay_ms.saturating_mul(1_u64 << exponent)
            }
        };
        raw.min(max_delay_ms)
    }

    /// Same as [`delay_ms`](Self::delay_ms) as a [`Duration`].
    #[must_use]
    pub fn delay(&self, attempts: u32, max_delay: Duration) -> Duration {
        Duration::from_millis(self.delay_ms(attempts, duration_ms(max_delay)))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_delay_ms: 1_000,
        }
    }
}

const fn duration_ms(d: Duration) -> u64 {
    let ms = d.as_millis();
    if ms > u64::MAX as u128 {
        u64::MAX
    } else {
        ms as u64
    }
}
