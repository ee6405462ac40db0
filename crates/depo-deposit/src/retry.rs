//! Bounded exponential backoff for transient failures.

use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each later attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping, for tests.
    pub fn immediate(attempts: u32) -> Self {
        RetryPolicy {
            attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors for which [`DepositError::is_transient`](crate::DepositError::is_transient)
    /// holds are retried; the last error is returned unchanged.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{what}: attempt {attempt}/{attempts} failed ({err}); retrying in {}ms",
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepositError;

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
        assert_eq!(policy.delay_after(40), Duration::from_millis(300));
    }

    #[test]
    fn retries_transient_until_success() {
        let mut calls = 0;
        let result = RetryPolicy::immediate(3).run("download", || {
            calls += 1;
            if calls < 3 {
                Err(DepositError::NetworkTimeout {
                    context: "download".into(),
                })
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::immediate(3).run("download", || {
            calls += 1;
            Err(DepositError::NetworkTimeout {
                context: "download".into(),
            })
        });
        assert!(matches!(result, Err(DepositError::NetworkTimeout { .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::immediate(3).run("lookup", || {
            calls += 1;
            Err(DepositError::NotFound {
                what: "release v9".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
