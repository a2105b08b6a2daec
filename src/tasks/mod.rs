//! # Action abstractions.
//!
//! This module provides the action-related types:
//! - [`Action`] - trait for implementing async cancelable operations
//! - [`ActionFn`] - closure-backed action implementation
//! - [`ActionRef`] - shared reference to an action (`Arc<dyn Action<A, T>>`)
//! - [`ExecutionContext`] - cancellation token, generation and attempt of one call

mod action;
mod action_fn;
mod context;

pub use action::{Action, ActionRef, BoxActionFuture};
pub use action_fn::ActionFn;
pub use context::ExecutionContext;
