//! # Retry policy for failed action attempts.
//!
//! [`RetryPolicy`] controls how many times an invocation is retried after a retryable
//! failure and how long to wait in between:
//! - [`RetryPolicy::max_retries`] the number of extra attempts (`0` = no retry);
//! - [`RetryPolicy::delay`] a fixed wait before each retry (`Duration::ZERO` = immediate).
//!
//! Retries belong to the same invocation: they reuse its generation and cancellation
//! token, and `loading` stays `true` until the last attempt settles.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tasksync::RetryPolicy;
//!
//! let retry = RetryPolicy::new(3);
//! assert!(retry.allows(0));
//! assert!(retry.allows(2));
//! assert!(!retry.allows(3));
//! assert_eq!(retry.delay(), None);
//!
//! let retry = retry.with_delay(Duration::from_millis(250));
//! assert_eq!(retry.delay(), Some(Duration::from_millis(250)));
//! ```

use std::time::Duration;

/// Retry policy applied by the controller's attempt loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Wait before each retry (`Duration::ZERO` = retry immediately).
    pub wait: Duration,
}

impl RetryPolicy {
    /// Retries up to `max_retries` times, immediately.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            wait: Duration::ZERO,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns a new policy with a fixed wait before each retry.
    pub fn with_delay(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Returns `true` if another retry is allowed after `retries_so_far` retries.
    #[inline]
    pub fn allows(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// Returns the wait before a retry as an `Option`.
    ///
    /// - `None` → retry immediately
    /// - `Some(d)` → sleep `d` (cancellable) before retrying
    #[inline]
    pub fn delay(&self) -> Option<Duration> {
        if self.wait == Duration::ZERO {
            None
        } else {
            Some(self.wait)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_never_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.allows(0));
        assert_eq!(policy, RetryPolicy::none());
    }

    #[test]
    fn test_allows_exactly_max_retries() {
        let policy = RetryPolicy::new(3);
        let allowed = (0..10).filter(|n| policy.allows(*n)).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn test_zero_wait_is_immediate() {
        assert_eq!(RetryPolicy::new(1).delay(), None);
        assert_eq!(
            RetryPolicy::new(1)
                .with_delay(Duration::from_secs(1))
                .delay(),
            Some(Duration::from_secs(1))
        );
    }
}
