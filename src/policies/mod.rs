//! Retry policy.
//!
//! This module groups the knobs that control **if/when** a failed action attempt is
//! invoked again.
//!
//! ## Contents
//! - [`RetryPolicy`] how many retries and how long to wait before each one
//!
//! ## Quick wiring
//! ```text
//! TaskConfig { retry: RetryPolicy, .. }
//!      └─► TaskController attempt loop uses:
//!           - retry.allows(retries_so_far) to decide retry/commit failure
//!           - retry.delay() to wait (cancellable) before the next attempt
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → max_retries=0, wait=0 (no retry).

mod retry;

pub use retry::RetryPolicy;
