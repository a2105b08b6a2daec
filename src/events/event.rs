//! # Runtime events emitted by task controllers.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Invocation events**: execute flow (started, cache hit, attempt failed, retry, terminal)
//! - **Control events**: cancel, reset, polling timer armed, stale results discarded
//! - **Subscriber events**: fan-out problems (overflow, panic)
//!
//! The [`Event`] struct carries additional metadata such as timestamps, action name,
//! task key, generation and attempt numbers.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use tasksync::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::AttemptFailed)
//!     .with_task("load-user")
//!     .with_key("user:42")
//!     .with_reason("boom")
//!     .with_attempt(2);
//!
//! assert_eq!(ev.kind, EventKind::AttemptFailed);
//! assert_eq!(ev.key.as_deref(), Some("user:42"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Invocation events ===
    /// A new invocation started (new generation allocated, `loading = true`).
    ///
    /// Sets:
    /// - `task`: action name
    /// - `key`: resolved task key (if any)
    /// - `generation`: request generation of the invocation
    ExecuteStarted,

    /// `execute` returned a still-valid cached result without invoking the action.
    ///
    /// Sets:
    /// - `task`, `key`
    CacheHit,

    /// One attempt of the action failed.
    ///
    /// Sets:
    /// - `task`, `key`, `generation`
    /// - `attempt`: 0-based attempt number
    /// - `reason`: failure message
    AttemptFailed,

    /// Another attempt will run for the same generation.
    ///
    /// Sets:
    /// - `task`, `key`, `generation`
    /// - `attempt`: retry number about to run (1-based)
    /// - `delay_ms`: wait before the retry (0 = immediate)
    RetryScheduled,

    /// The invocation committed a successful result.
    ///
    /// Sets:
    /// - `task`, `key`, `generation`
    TaskSucceeded,

    /// The invocation committed a terminal failure (retries exhausted or fatal error).
    ///
    /// Sets:
    /// - `task`, `key`, `generation`
    /// - `attempt`: retries consumed
    /// - `reason`: final error message
    TaskFailed,

    // === Control events ===
    /// A result was dropped because it was superseded, cancelled or arrived after unmount.
    ///
    /// Sets:
    /// - `task`, `key`, `generation`
    /// - `reason`: "superseded", "cancelled" or "unmounted"
    ResultDiscarded,

    /// `cancel()` was called on a controller.
    ///
    /// Sets:
    /// - `task`, `key`
    /// - `generation`: the new (bumped) generation
    TaskCancelled,

    /// `reset()` was called on a controller (store entry purged when keyed).
    ///
    /// Sets:
    /// - `task`, `key`
    TaskReset,

    /// The next polling run was armed.
    ///
    /// Sets:
    /// - `task`, `key`
    /// - `delay_ms`: polling interval
    PollScheduled,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the action (or subscriber for subscriber events).
    pub task: Option<Arc<str>>,
    /// Resolved task key, if the controller is keyed.
    pub key: Option<Arc<str>>,
    /// Request generation the event belongs to.
    pub generation: Option<u64>,
    /// Attempt or retry number.
    pub attempt: Option<u32>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            key: None,
            generation: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an action name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a task key (no-op for `None`).
    #[inline]
    pub fn with_key_opt(mut self, key: Option<&str>) -> Self {
        self.key = key.map(Arc::from);
        self
    }

    /// Attaches a task key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a request generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::ExecuteStarted);
        let b = Event::new(EventKind::TaskSucceeded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_delay_is_clamped_to_u32() {
        let ev = Event::new(EventKind::PollScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn test_key_opt_none_leaves_key_empty() {
        let ev = Event::new(EventKind::CacheHit).with_key_opt(None);
        assert!(ev.key.is_none());
    }
}
