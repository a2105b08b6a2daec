//! # tasksync
//!
//! **Tasksync** coordinates asynchronous actions on the client side.
//!
//! It wraps an action (a fetch, a computation, any cancelable future) in a controller that
//! tracks `loading / data / error`, discards stale results, retries failures, polls, reuses
//! cached results and keeps every controller bound to the same key in sync.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//!   │  TaskController  │   │  TaskController  │   │  TaskController  │
//!   │  key = "user:1"  │   │  key = "user:1"  │   │  key = "user:2"  │
//!   └───┬─────────▲────┘   └───┬─────────▲────┘   └───┬─────────▲────┘
//!       │ write   │ mirror     │ write   │ mirror     │ write   │ mirror
//!       ▼         │            ▼         │            ▼         │
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  KeyedStore<T>                                                    │
//! │  - key → TaskState { AsyncState, request_id }                     │
//! │  - key → ordered listeners (synchronous fan-out)                  │
//! └───────────────────────────────────────────────────────────────────┘
//!
//!   TaskController ──(optional)──► Bus ──► SubscriberSet ──► LogWriter / custom
//! ```
//!
//! ### Lifecycle of `execute(args)`
//! ```text
//! resolve key (error ─► Err(ExecuteError))
//!   ├─► subscribe to key, adopt existing entry
//!   ├─► cache window open? ─► commit cached state, return (no generation consumed)
//!   ├─► cancel previous token and pending poll, generation += 1, loading = true
//!   │   (local + store entry tagged with a process-unique request id)
//!   │
//! loop {
//!   ├─► action.call(args, ExecutionContext { token, generation, attempt })
//!   ├─► unmounted / superseded / cancelled ─► ResultDiscarded, return None
//!   ├─► Ok  ──► commit data (local + store), return Some(data)
//!   └─► Err ──► Fail and retries left ─► retry_count += 1, wait (cancellable), continue
//!               otherwise             ─► commit error (local + store), return None
//! }
//!
//! terminal outcome or cache hit ─► arm next poll (if polling and auto-run)
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Controller**    | Race control, retries, caching, polling, lifecycle hooks.        | [`TaskController`], [`TaskConfig`]          |
//! | **Shared state**  | Keyed store with listeners and a cache validity policy.          | [`KeyedStore`], [`AsyncState`]              |
//! | **Actions**       | Define actions as closures or trait objects.                     | [`Action`], [`ActionFn`], [`ActionRef`]     |
//! | **Policies**      | Retry count and delay.                                           | [`RetryPolicy`]                             |
//! | **Subscriber API**| Observe controller events (logging, metrics, custom subscribers).| [`Subscribe`], [`Bus`]                      |
//! | **Errors**        | Typed errors for actions and key derivation.                     | [`TaskError`], [`ExecuteError`]             |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber backed by `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tasksync::{ActionFn, ActionRef, ExecutionContext, KeyedStore, TaskConfig, TaskController, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let load: ActionRef<u32, String> = ActionFn::arc("load-user", |id: u32, ctx: ExecutionContext| async move {
//!         if ctx.is_cancelled() {
//!             return Err(TaskError::Canceled);
//!         }
//!         Ok(format!("user #{id}"))
//!     });
//!
//!     let cfg = TaskConfig::default()
//!         .with_immediate(false)
//!         .with_max_retries(2)
//!         .with_cache_time(Duration::from_secs(30))
//!         .with_task_key(tasksync::TaskKey::derive(|id: &u32| format!("user:{id}")));
//!
//!     let ctrl = TaskController::builder(load)
//!         .with_config(cfg)
//!         .with_store(KeyedStore::new())
//!         .build();
//!
//!     assert_eq!(ctrl.execute(1).await?, Some("user #1".to_string()));
//!     assert!(!ctrl.state().loading);
//!     Ok(())
//! }
//! ```
mod controller;
mod error;
mod events;
mod policies;
mod store;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use controller::{
    Dependency, KeyFn, RunHandle, TaskConfig, TaskController, TaskControllerBuilder, TaskKey,
    dependencies_changed,
};
pub use error::{ExecuteError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::RetryPolicy;
pub use store::{
    AsyncState, KeyedStore, Listener, StatePatch, Subscription, TaskState, is_cache_valid,
    is_cache_valid_at,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Action, ActionFn, ActionRef, BoxActionFuture, ExecutionContext};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
