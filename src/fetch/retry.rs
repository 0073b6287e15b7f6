//! Bounded retry policy shared by the fetcher and the cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior.
///
/// The number of attempts is always bounded. With `backoff_multiplier == 1.0`
/// every retry waits `initial_delay_ms`; larger multipliers grow the delay
/// geometrically up to `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `n` attempts with no waiting in between.
    #[must_use]
    pub const fn immediate(n: u32) -> Self {
        Self {
            max_attempts: n,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Every attempt failed; carries the last failure.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// The closure receives the 1-based attempt number. A policy with zero
/// attempts still runs the operation once.
///
/// # Errors
/// Returns [`RetryExhausted`] with the last error when no attempt succeeded.
pub fn retry_with_backoff<T, E, F>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Result<T, E>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                let delay = policy.delay_after(attempt);
                debug!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let p = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 250,
            backoff_multiplier: 2.0,
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(250));
    }

    #[test]
    fn stops_at_max_attempts() {
        let mut calls = 0;
        let res: Result<(), _> = retry_with_backoff(&RetryPolicy::immediate(4), |_| {
            calls += 1;
            Err("nope")
        });
        let err = res.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(calls, 4);
    }

    #[test]
    fn returns_first_success() {
        let res = retry_with_backoff(&RetryPolicy::immediate(5), |attempt| {
            if attempt < 3 { Err("later") } else { Ok(attempt) }
        });
        assert_eq!(res.unwrap(), 3);
    }
}
