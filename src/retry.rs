//! Bounded retry for metadata read-modify-write sequences.
//!
//! Operations are plain blocking calls, so the policy sleeps the calling
//! thread between attempts. Only errors for which
//! [`StoreError::is_transient`] holds are retried; everything else is
//! returned from the first attempt.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{Result, StoreError};

/// Fixed-budget, fixed-delay retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. At least 1.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Policy that retries without sleeping. Used by tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget
    /// is exhausted. On exhaustion the last transient error is returned.
    pub fn run<T, F>(&self, what: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.run_outcome(what, operation).result
    }

    /// Like [`RetryPolicy::run`], also reporting how many attempts were made.
    pub fn run_outcome<T, F>(&self, what: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Result<T>,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(what, attempt, "succeeded after retry");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    debug!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(what, attempts = attempt, error = %err, "retry budget exhausted");
                    }
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The value or the final error.
    pub result: std::result::Result<T, StoreError>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total time spent, including delays.
    pub elapsed: Duration,
}
