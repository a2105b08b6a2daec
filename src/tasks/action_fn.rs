//! # Function-backed action (`ActionFn`)
//!
//! [`ActionFn`] wraps a closure `F: Fn(A, ExecutionContext) -> Fut`, producing a fresh
//! future per call. There is no hidden mutation between attempts; if state must be
//! shared, capture an `Arc<...>` explicitly inside the closure.
//!
//! ## Example
//! ```rust
//! use tasksync::{ActionFn, ActionRef, ExecutionContext, TaskError};
//!
//! let double: ActionRef<u32, u32> = ActionFn::arc("double", |n: u32, ctx: ExecutionContext| async move {
//!     if ctx.is_cancelled() {
//!         return Err(TaskError::Canceled);
//!     }
//!     Ok::<_, TaskError>(n * 2)
//! });
//!
//! assert_eq!(double.name(), "double");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use crate::error::TaskError;
use crate::tasks::action::{Action, BoxActionFuture};
use crate::tasks::context::ExecutionContext;

/// Function-backed action implementation.
#[derive(Debug)]
pub struct ActionFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ActionFn<F> {
    /// Creates a new function-backed action.
    ///
    /// Prefer [`ActionFn::arc`] when you immediately need an [`ActionRef`](crate::ActionRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the action and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<A, T, F, Fut> Action<A, T> for ActionFn<F>
where
    F: Fn(A, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: A, ctx: ExecutionContext) -> BoxActionFuture<T> {
        Box::pin((self.f)(args, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_each_call_builds_a_fresh_future() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let action = ActionFn::new("count", move |n: u32, _ctx: ExecutionContext| {
            let counter = Arc::clone(&counter);
            async move { Ok::<_, TaskError>(counter.fetch_add(1, Ordering::SeqCst) + n) }
        });

        assert_eq!(action.call(10, ExecutionContext::detached()).await, Ok(10));
        assert_eq!(action.call(10, ExecutionContext::detached()).await, Ok(11));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_context_reports_attempt_and_cancellation() {
        let action = ActionFn::new("ctx", |_: (), ctx: ExecutionContext| async move {
            Ok::<_, TaskError>((ctx.attempt(), ctx.is_cancelled()))
        });
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();

        let out = action.call((), ExecutionContext::new(token, 4, 2)).await;
        assert_eq!(out, Ok((2, true)));
    }
}
