//! Exponential backoff for the health prober's retry loop.
//!
//! The schedule is deterministic by design — no jitter — so that the
//! kth inter-attempt sleep is exactly predictable from config, which is
//! what makes it possible to assert an exact backoff schedule in a test.
//!
//! ```
//! use std::time::Duration;
//! use sync_retry::BackoffPolicy;
//!
//! let policy = BackoffPolicy {
//!     initial_delay: Duration::from_millis(5000),
//!     backoff_factor: 2.0,
//!     max_delay: Duration::from_millis(60_000),
//! };
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(5000));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(10_000));
//! assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(20_000));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `initial * factor^(attempt-1)`, capped at `max`. Attempts are 1-indexed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_factor.powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }
}

/// Run `attempt` (1-indexed) via `body`, sleeping between failures per
/// `policy`, until `body` succeeds or `max_attempts` is exhausted. Returns
/// the last error on exhaustion.
pub fn retry_with_backoff<T, E>(
    max_attempts: u32,
    policy: &BackoffPolicy,
    mut body: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt = 1;
    loop {
        match body(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= max_attempts {
                    return Err(e);
                }
                std::thread::sleep(policy.delay_for_attempt(attempt));
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_millis(5000),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(60_000),
        }
    }

    #[test]
    fn matches_default_health_check_schedule() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(5000));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(10_000));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(20_000));
        assert_eq!(p.delay_for_attempt(4), Duration::from_millis(40_000));
    }

    #[test]
    fn caps_at_max_delay() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(10), Duration::from_millis(60_000));
    }

    #[test]
    fn factor_one_is_constant_delay() {
        let p = BackoffPolicy {
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(60_000),
        };
        for attempt in 1..=5 {
            assert_eq!(p.delay_for_attempt(attempt), Duration::from_millis(1000));
        }
    }

    #[test]
    fn retry_with_backoff_stops_on_first_success() {
        let mut calls = 0;
        let result: Result<(), &str> = retry_with_backoff(3, &policy(), |_attempt| {
            calls += 1;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_with_backoff_exhausts_attempts() {
        let mut calls = 0;
        let fast_policy = BackoffPolicy {
            initial_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        };
        let result: Result<(), &str> = retry_with_backoff(3, &fast_policy, |_attempt| {
            calls += 1;
            Err("fail")
        });
        assert_eq!(result, Err("fail"));
        assert_eq!(calls, 3);
    }

    proptest::proptest! {
        #[test]
        fn delay_never_exceeds_max(
            initial_ms in 1u64..100_000,
            factor in 1.0f64..5.0,
            max_ms in 1u64..100_000,
            attempt in 1u32..30,
        ) {
            let p = BackoffPolicy {
                initial_delay: Duration::from_millis(initial_ms),
                backoff_factor: factor,
                max_delay: Duration::from_millis(max_ms),
            };
            let d = p.delay_for_attempt(attempt);
            proptest::prop_assert!(d.as_millis() as u64 <= max_ms);
        }
    }
}
