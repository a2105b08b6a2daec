//! Error types used by actions and the task controller.
//!
//! This module defines two main error enums:
//!
//! - [`TaskError`] — errors raised by a single action invocation. These are captured into
//!   [`AsyncState::error`](crate::AsyncState::error) and never returned from `execute`.
//! - [`ExecuteError`] — configuration misuse detected before the action is invoked
//!   (for example a derived task key that cannot be computed). These are returned to the
//!   caller of [`TaskController::execute`](crate::TaskController::execute).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and [`TaskError::is_retryable`] decides whether the retry loop may run again.

use thiserror::Error;

/// # Errors produced by an action invocation.
///
/// Some errors are retryable (`Fail`), others end the invocation immediately.
/// `Canceled` is not a failure at all: the controller treats it as a discarded result.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Action failed but may succeed if invoked again.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (never retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Action observed its cancellation token and stopped.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for a retryable [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for a non-retryable [`TaskError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        TaskError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tasksync::TaskError;
    ///
    /// let err = TaskError::fail("connection reset");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Fatal { error } => format!("fatal: {error}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Indicates whether the retry loop may invoke the action again.
    ///
    /// Returns `true` only for [`TaskError::Fail`].
    ///
    /// # Example
    /// ```
    /// use tasksync::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Fail { .. })
    }
}

/// # Errors returned synchronously by `execute`.
///
/// These happen before the action is invoked, so nothing is written to task state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// The derived task key function failed for the given arguments.
    #[error("task key derivation failed: {source}")]
    KeyDerivation {
        /// Error returned by the key function.
        #[source]
        source: anyhow::Error,
    },
}

impl ExecuteError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecuteError::KeyDerivation { .. } => "execute_key_derivation",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ExecuteError::KeyDerivation { source } => format!("key derivation: {source:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(TaskError::fail("x").as_label(), "task_failed");
        assert_eq!(TaskError::fatal("x").as_label(), "task_fatal");
        assert_eq!(TaskError::Canceled.as_label(), "task_canceled");

        let err = ExecuteError::KeyDerivation {
            source: anyhow::anyhow!("missing id"),
        };
        assert_eq!(err.as_label(), "execute_key_derivation");
        assert_eq!(err.as_message(), "key derivation: missing id");
    }

    #[test]
    fn test_only_fail_is_retryable() {
        assert!(TaskError::fail("x").is_retryable());
        assert!(!TaskError::fatal("x").is_retryable());
        assert!(!TaskError::Canceled.is_retryable());
    }
}
