//! # LogWriter — tracing-backed event writer
//!
//! A minimal subscriber that forwards incoming [`Event`]s to `tracing`.
//! Failures and subscriber problems are logged at `warn`, discards and control
//! events at `debug`, everything else at `info`.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO  [starting] task="load-user" key=Some("user:42") generation=Some(3)
//! WARN  [attempt-failed] task="load-user" attempt=Some(0) err=Some("timeout")
//! INFO  [retry] task="load-user" attempt=Some(1) delay_ms=Some(0)
//! INFO  [succeeded] task="load-user" key=Some("user:42") generation=Some(3)
//! DEBUG [discarded] task="load-user" generation=Some(2) reason=Some("superseded")
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::ExecuteStarted => {
                tracing::info!(
                    "[starting] task={task:?} key={:?} generation={:?}",
                    e.key,
                    e.generation
                );
            }
            EventKind::CacheHit => {
                tracing::info!("[cache-hit] task={task:?} key={:?}", e.key);
            }
            EventKind::AttemptFailed => {
                tracing::warn!(
                    "[attempt-failed] task={task:?} attempt={:?} err={:?}",
                    e.attempt,
                    e.reason
                );
            }
            EventKind::RetryScheduled => {
                tracing::info!(
                    "[retry] task={task:?} attempt={:?} delay_ms={:?}",
                    e.attempt,
                    e.delay_ms
                );
            }
            EventKind::TaskSucceeded => {
                tracing::info!(
                    "[succeeded] task={task:?} key={:?} generation={:?}",
                    e.key,
                    e.generation
                );
            }
            EventKind::TaskFailed => {
                tracing::warn!(
                    "[failed] task={task:?} key={:?} retries={:?} err={:?}",
                    e.key,
                    e.attempt,
                    e.reason
                );
            }
            EventKind::ResultDiscarded => {
                tracing::debug!(
                    "[discarded] task={task:?} generation={:?} reason={:?}",
                    e.generation,
                    e.reason
                );
            }
            EventKind::TaskCancelled => {
                tracing::debug!("[cancelled] task={task:?} key={:?}", e.key);
            }
            EventKind::TaskReset => {
                tracing::debug!("[reset] task={task:?} key={:?}", e.key);
            }
            EventKind::PollScheduled => {
                tracing::debug!("[poll] task={task:?} delay_ms={:?}", e.delay_ms);
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(
                    "[subscriber-overflow] subscriber={task} reason={:?}",
                    e.reason
                );
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(
                    "[subscriber-panicked] subscriber={task} info={}",
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
