//! Retry engine
//!
//! Runs an attempt function until it succeeds, fails with a kind outside the
//! retryable set, or the attempt budget is spent. The attempt function is
//! responsible for re-resolving its target on every call.

use crate::error::{ErrorKind, Result};
use std::thread;
use std::time::Duration;

/// Default number of attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How one attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Attempt succeeded
    Success,
    /// Attempt failed with a kind the policy retries
    Retryable(ErrorKind),
    /// Attempt failed with a kind that ends the sequence
    Fatal(ErrorKind),
}

/// Record of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashAttempt {
    /// 1-based attempt counter
    pub number: u32,
    /// How it ended
    pub outcome: AttemptOutcome,
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryReport<T> {
    /// First success, or the last failure
    pub result: Result<T>,
    /// Every attempt made, in order
    pub attempts: Vec<FlashAttempt>,
}

impl<T> RetryReport<T> {
    /// Number of attempts made
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Which failures to retry, how often, and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            retryable: ErrorKind::ALL
                .iter()
                .copied()
                .filter(|k| k.is_retryable())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default retryable set
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            ..Self::default()
        }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Replace the retryable set
    pub fn with_retryable(mut self, kinds: &[ErrorKind]) -> Self {
        self.retryable = kinds.to_vec();
        self
    }

    /// Attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Whether a kind is retried under this policy
    pub fn retries(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Whether attempt `number` failing with `kind` is followed by another
    pub fn will_retry(&self, number: u32, kind: ErrorKind) -> bool {
        self.retries(kind) && number < self.max_attempts
    }

    /// Run `attempt` under this policy
    ///
    /// `attempt` receives the 1-based attempt number.
    pub fn run<T, F>(&self, mut attempt: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempts = Vec::new();
        let mut number = 1;

        loop {
            let result = attempt(number);
            let outcome = match &result {
                Ok(_) => AttemptOutcome::Success,
                Err(e) if self.retries(e.kind) => AttemptOutcome::Retryable(e.kind),
                Err(e) => AttemptOutcome::Fatal(e.kind),
            };
            attempts.push(FlashAttempt { number, outcome });

            let retry = match (&outcome, &result) {
                (AttemptOutcome::Retryable(kind), Err(e)) if self.will_retry(number, *kind) => {
                    log::warn!(
                        "Attempt {}/{} failed ({}): {}, retrying",
                        number,
                        self.max_attempts,
                        kind,
                        e.message
                    );
                    true
                }
                _ => false,
            };

            if !retry {
                return RetryReport { result, attempts };
            }
            if !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
            number += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlashError;

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::ZERO)
    }

    #[test]
    fn test_success_first_try() {
        let report = policy(5).run(|_| Ok(42));
        assert_eq!(report.attempt_count(), 1);
        assert_eq!(report.result.unwrap(), 42);
    }

    #[test]
    fn test_retry_until_success() {
        let report = policy(5).run(|n| {
            if n < 3 {
                Err(FlashError::new(ErrorKind::DaplinkTransientError, "flaky"))
            } else {
                Ok(n)
            }
        });
        assert_eq!(report.attempt_count(), 3);
        assert_eq!(
            report.attempts[0].outcome,
            AttemptOutcome::Retryable(ErrorKind::DaplinkTransientError)
        );
        assert_eq!(report.attempts[2].outcome, AttemptOutcome::Success);
        assert_eq!(report.result.unwrap(), 3);
    }

    #[test]
    fn test_fatal_stops_immediately() {
        let mut calls = 0;
        let report: RetryReport<()> = policy(5).run(|_| {
            calls += 1;
            Err(FlashError::new(ErrorKind::DaplinkUserError, "bad image"))
        });
        assert_eq!(calls, 1);
        assert_eq!(
            report.attempts[0].outcome,
            AttemptOutcome::Fatal(ErrorKind::DaplinkUserError)
        );
        assert_eq!(report.result.unwrap_err().kind, ErrorKind::DaplinkUserError);
    }

    #[test]
    fn test_attempts_bounded() {
        for max in 1..6 {
            let report: RetryReport<()> =
                policy(max).run(|_| Err(FlashError::new(ErrorKind::OsError, "io")));
            assert_eq!(report.attempt_count(), max);
            assert_eq!(report.result.unwrap_err().kind, ErrorKind::OsError);
        }
    }

    #[test]
    fn test_custom_retryable_set() {
        let p = policy(3).with_retryable(&[ErrorKind::FileStillPresent]);
        assert!(p.retries(ErrorKind::FileStillPresent));
        assert!(!p.retries(ErrorKind::OsError));

        let report: RetryReport<()> =
            p.run(|_| Err(FlashError::new(ErrorKind::OsError, "io")));
        assert_eq!(report.attempt_count(), 1);
    }

    #[test]
    fn test_will_retry() {
        let p = policy(3);
        assert!(p.will_retry(1, ErrorKind::OsError));
        assert!(p.will_retry(2, ErrorKind::DaplinkSoftwareError));
        assert!(!p.will_retry(3, ErrorKind::OsError));
        assert!(!p.will_retry(1, ErrorKind::DaplinkUserError));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::once().max_attempts(), 1);
    }
}
