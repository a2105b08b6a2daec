//! # Execution context passed to every action attempt.
//!
//! Carries the cooperative cancellation signal of the invocation together with the
//! request generation and attempt number. Cancellation is signaling only: the controller
//! never preempts an action, it just refuses to commit the result.

use tokio_util::sync::CancellationToken;

/// Per-attempt context handed to [`Action::call`](crate::Action::call).
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    token: CancellationToken,
    generation: u64,
    attempt: u32,
}

impl ExecutionContext {
    pub(crate) fn new(token: CancellationToken, generation: u64, attempt: u32) -> Self {
        Self {
            token,
            generation,
            attempt,
        }
    }

    /// Context that is never cancelled by a controller (useful for calling actions directly).
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), 0, 0)
    }

    /// Returns `true` once the invocation was cancelled or superseded.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the invocation is cancelled or superseded.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Underlying token, for I/O layers that understand `CancellationToken`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Request generation this attempt belongs to.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Attempt number within the invocation (0 = first try, n = n-th retry).
    #[inline]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
