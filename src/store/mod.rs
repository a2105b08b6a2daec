//! # Keyed state store.
//!
//! Leaf component with no dependency on the controller:
//! - [`AsyncState`], [`TaskState`], [`StatePatch`] — state snapshots and partial updates
//! - [`KeyedStore`] — key → latest state, key → ordered listeners, synchronous fan-out
//! - [`Subscription`] — RAII handle for a registered listener
//! - [`is_cache_valid`] / [`is_cache_valid_at`] — cache window policy

mod keyed;
mod state;

pub use keyed::{KeyedStore, Listener, Subscription};
pub use state::{AsyncState, StatePatch, TaskState, is_cache_valid, is_cache_valid_at};
