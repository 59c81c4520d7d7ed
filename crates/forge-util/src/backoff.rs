// SPDX-License-Identifier: Apache-2.0

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

/// Retry policy for transient failures (network hiccups, lock contention).
/// `Policy::fixed` covers the 3-attempts-at-2ms Git init retry; `Policy::new`
/// covers the configurable exponential backoff used around remote-execution
/// and fetch calls.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Policy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            multiplier: 2.0,
        }
    }

    /// No backoff growth, fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: delay,
            max_backoff: delay,
            multiplier: 1.0,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }

    /// Runs `op` until it succeeds or `max_attempts` is exhausted, sleeping
    /// between attempts according to the policy. The last error is returned
    /// if every attempt fails.
    pub fn retry<T>(&self, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= self.max_attempts => {
                    warn!(attempt, max_attempts = self.max_attempts, %e, "giving up after exhausting retries");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, ?delay, %e, "retrying after transient failure");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(50), Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_until_success() {
        let policy = Policy::fixed(5, Duration::from_millis(0));
        let calls = Cell::new(0);
        let result = policy.retry(|_attempt| {
            let n = calls.get() + 1;
            calls.set(n);
            if n < 3 {
                anyhow::bail!("not yet")
            } else {
                Ok(n)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = Policy::fixed(3, Duration::from_millis(0));
        let calls = Cell::new(0);
        let result: Result<()> = policy.retry(|_| {
            calls.set(calls.get() + 1);
            anyhow::bail!("always fails")
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn git_init_retry_policy_matches_three_attempts_at_two_millis() {
        let policy = Policy::fixed(3, Duration::from_millis(2));
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(2));
    }
}
