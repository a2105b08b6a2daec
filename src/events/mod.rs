//! Controller events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by task controllers and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `TaskController` (when built with a bus), `SubscriberSet` workers
//!   (overflow/panic).
//! - **Consumers**: `SubscriberSet::listen()` fans events out to user subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
