//! # Action abstraction.
//!
//! This module defines the [`Action`] trait: an asynchronous, cancelable operation
//! parameterized by arguments `A` and producing `T`. The common handle type is
//! [`ActionRef`], an `Arc<dyn Action<A, T>>` suitable for sharing between controllers.
//!
//! An action receives an [`ExecutionContext`] and should check it (or hand its token to
//! an I/O layer that does) to stop cooperatively when superseded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TaskError;
use crate::tasks::context::ExecutionContext;

/// Boxed future returned by [`Action::call`].
pub type BoxActionFuture<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send + 'static>>;

/// Shared handle to an action.
pub type ActionRef<A, T> = Arc<dyn Action<A, T>>;

/// # Asynchronous, cancelable operation.
///
/// Each [`call`](Action::call) produces a **fresh** future for one attempt; retries call
/// it again with the same arguments.
///
/// # Example
/// ```
/// use tasksync::{Action, BoxActionFuture, ExecutionContext, TaskError};
///
/// struct Square;
///
/// impl Action<u32, u64> for Square {
///     fn name(&self) -> &str { "square" }
///
///     fn call(&self, n: u32, ctx: ExecutionContext) -> BoxActionFuture<u64> {
///         Box::pin(async move {
///             if ctx.is_cancelled() {
///                 return Err(TaskError::Canceled);
///             }
///             Ok(u64::from(n) * u64::from(n))
///         })
///     }
/// }
/// ```
pub trait Action<A, T>: Send + Sync + 'static {
    /// Returns a stable, human-readable action name (used in events).
    fn name(&self) -> &str;

    /// Starts one attempt with `args`.
    fn call(&self, args: A, ctx: ExecutionContext) -> BoxActionFuture<T>;
}
