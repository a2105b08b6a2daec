//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! built-in implementations for handling events broadcast through the
//! [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! TaskController ── publish(Event) ──► Bus ──► SubscriberSet::listen
//!                                                  │
//!                                        ┌─────────┼─────────┐
//!                                        ▼         ▼         ▼
//!                                    LogWriter  Metrics   Custom
//! ```

mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
mod embedded;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
