//! # Task state snapshots.
//!
//! - [`AsyncState`] is what consumers see: data, loading flag, last error, retry count
//!   and the time of the last terminal transition.
//! - [`TaskState`] is the store entry: an `AsyncState` tagged with the id of the request that wrote it
//!   that wrote it. The tag is stripped before subscribers are notified.
//! - [`StatePatch`] is a shallow partial update used by
//!   [`KeyedStore::update_state`](crate::KeyedStore::update_state).
//!
//! ## Invariants
//! - A successful commit clears `error`; a failed commit never sets `data`.
//! - `loading == true` never coexists with a freshly committed terminal `data`/`error`.

use std::time::{Duration, SystemTime};

use crate::error::TaskError;

/// Externally visible snapshot of a task's outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct AsyncState<T> {
    /// Last successfully produced value.
    pub data: Option<T>,
    /// `true` strictly while an invocation (including its retries) is outstanding.
    pub loading: bool,
    /// Error of the most recent terminal failure.
    pub error: Option<TaskError>,
    /// Retries consumed by the current/last invocation.
    pub retry_count: u32,
    /// Wall-clock time of the last successful or failed terminal transition.
    pub last_updated: Option<SystemTime>,
}

impl<T> Default for AsyncState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            retry_count: 0,
            last_updated: None,
        }
    }
}

impl<T> AsyncState<T> {
    /// Returns `true` if a value has been produced.
    #[inline]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Returns `true` if the last terminal transition was a failure.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Marks a new invocation as started. `data` and `error` are kept.
    pub(crate) fn begin(&mut self) {
        self.loading = true;
        self.retry_count = 0;
    }

    /// Commits a successful result.
    pub(crate) fn succeed(&mut self, data: T, at: SystemTime) {
        self.data = Some(data);
        self.loading = false;
        self.error = None;
        self.retry_count = 0;
        self.last_updated = Some(at);
    }

    /// Commits a terminal failure. `data` keeps its last known good value.
    pub(crate) fn fail(&mut self, error: TaskError, retry_count: u32, at: SystemTime) {
        self.loading = false;
        self.error = Some(error);
        self.retry_count = retry_count;
        self.last_updated = Some(at);
    }
}

/// Store entry: [`AsyncState`] plus the id of the request that wrote it.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskState<T> {
    /// Public part delivered to subscribers.
    pub state: AsyncState<T>,
    /// Process-unique id of the writing request (ownership token, never delivered to subscribers).
    pub request_id: u64,
}

impl<T> TaskState<T> {
    /// Creates an entry with every field at its empty/zero value.
    pub fn initial(request_id: u64) -> Self {
        Self {
            state: AsyncState::default(),
            request_id,
        }
    }

    /// Wraps a public state with a request id.
    pub fn tagged(state: AsyncState<T>, request_id: u64) -> Self {
        Self { state, request_id }
    }

    /// Projection without the request id.
    pub fn public(&self) -> AsyncState<T>
    where
        T: Clone,
    {
        self.state.clone()
    }

    /// Returns `true` if the entry is still usable as a cached result.
    ///
    /// See [`is_cache_valid_at`].
    pub fn is_fresh(&self, cache_time: Duration, now: SystemTime) -> bool {
        is_cache_valid_at(Some(self), cache_time, now)
    }
}

impl<T> Default for TaskState<T> {
    fn default() -> Self {
        Self::initial(0)
    }
}

/// Shallow partial update of a [`TaskState`].
///
/// Every `Some` field overwrites the corresponding entry field; `None` leaves it alone.
#[derive(Clone, Debug)]
pub struct StatePatch<T> {
    pub data: Option<Option<T>>,
    pub loading: Option<bool>,
    pub error: Option<Option<TaskError>>,
    pub retry_count: Option<u32>,
    pub last_updated: Option<Option<SystemTime>>,
    pub request_id: Option<u64>,
}

impl<T> Default for StatePatch<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: None,
            error: None,
            retry_count: None,
            last_updated: None,
            request_id: None,
        }
    }
}

impl<T> StatePatch<T> {
    /// Empty patch; applying it changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `data` (`None` clears it).
    pub fn data(mut self, data: Option<T>) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the `loading` flag.
    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = Some(loading);
        self
    }

    /// Replaces `error` (`None` clears it).
    pub fn error(mut self, error: Option<TaskError>) -> Self {
        self.error = Some(error);
        self
    }

    /// Sets the retry counter.
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = Some(n);
        self
    }

    /// Replaces the completion timestamp.
    pub fn last_updated(mut self, at: Option<SystemTime>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// Re-tags the entry with another request id.
    pub fn request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Merges the patch into `target`.
    pub fn apply(self, target: &mut TaskState<T>) {
        if let Some(data) = self.data {
            target.state.data = data;
        }
        if let Some(loading) = self.loading {
            target.state.loading = loading;
        }
        if let Some(error) = self.error {
            target.state.error = error;
        }
        if let Some(n) = self.retry_count {
            target.state.retry_count = n;
        }
        if let Some(at) = self.last_updated {
            target.state.last_updated = at;
        }
        if let Some(id) = self.request_id {
            target.request_id = id;
        }
    }
}

/// Returns `true` if `state` may be served from cache right now.
///
/// Shorthand for [`is_cache_valid_at`] with `SystemTime::now()`.
pub fn is_cache_valid<T>(state: Option<&TaskState<T>>, cache_time: Duration) -> bool {
    is_cache_valid_at(state, cache_time, SystemTime::now())
}

/// Cache validity against an explicit clock reading.
///
/// Returns `false` if the entry is absent, has never reached a terminal state, or if
/// `cache_time` is zero. Otherwise `now - last_updated < cache_time` (strict: an entry
/// exactly `cache_time` old is stale). A `last_updated` in the future counts as age zero.
///
/// # Example
/// ```
/// use std::time::{Duration, SystemTime};
/// use tasksync::{AsyncState, TaskState, is_cache_valid_at};
///
/// let now = SystemTime::now();
/// let ttl = Duration::from_secs(10);
/// let mut state = AsyncState::<u32>::default();
/// state.last_updated = Some(now - ttl);
/// let entry = TaskState::tagged(state, 1);
///
/// assert!(!is_cache_valid_at(Some(&entry), ttl, now));
/// assert!(is_cache_valid_at(Some(&entry), ttl, now - Duration::from_millis(1)));
/// ```
pub fn is_cache_valid_at<T>(
    state: Option<&TaskState<T>>,
    cache_time: Duration,
    now: SystemTime,
) -> bool {
    let Some(entry) = state else {
        return false;
    };
    let Some(last) = entry.state.last_updated else {
        return false;
    };
    if cache_time == Duration::ZERO {
        return false;
    }
    let age = now.duration_since(last).unwrap_or(Duration::ZERO);
    age < cache_time
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(at: SystemTime) -> TaskState<&'static str> {
        let mut state = AsyncState::default();
        state.succeed("cached", at);
        TaskState::tagged(state, 1)
    }

    #[test]
    fn test_initial_state_is_idle() {
        let entry = TaskState::<u8>::initial(4);
        assert_eq!(entry.request_id, 4);
        assert_eq!(entry.public(), AsyncState::default());
        assert!(!entry.state.loading);
        assert!(!entry.state.has_data());
        assert!(!entry.state.is_error());
        assert_eq!(entry.state.retry_count, 0);
    }

    #[test]
    fn test_cache_boundary_is_strict() {
        let now = SystemTime::now();
        let ttl = Duration::from_millis(5_000);

        let exact = entry_at(now - ttl);
        assert!(!is_cache_valid_at(Some(&exact), ttl, now));

        let just_inside = entry_at(now - ttl + Duration::from_millis(1));
        assert!(is_cache_valid_at(Some(&just_inside), ttl, now));
    }

    #[test]
    fn test_cache_invalid_without_entry_timestamp_or_ttl() {
        let now = SystemTime::now();
        let ttl = Duration::from_secs(1);

        assert!(!is_cache_valid_at::<u8>(None, ttl, now));
        assert!(!is_cache_valid_at(Some(&TaskState::<u8>::initial(0)), ttl, now));
        assert!(!is_cache_valid_at(Some(&entry_at(now)), Duration::ZERO, now));
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let now = SystemTime::now();
        let entry = entry_at(now + Duration::from_secs(60));
        assert!(entry.is_fresh(Duration::from_secs(1), now));
    }

    #[test]
    fn test_success_clears_error_failure_keeps_data() {
        let now = SystemTime::now();
        let mut state = AsyncState::default();
        state.begin();
        state.fail(TaskError::fail("first"), 2, now);
        assert!(!state.loading);
        assert!(state.data.is_none());
        assert_eq!(state.retry_count, 2);

        state.begin();
        state.succeed(7, now);
        assert_eq!(state.data, Some(7));
        assert!(state.error.is_none());
        assert_eq!(state.retry_count, 0);

        state.begin();
        assert!(state.loading);
        state.fail(TaskError::fail("second"), 0, now);
        assert_eq!(state.data, Some(7));
        assert_eq!(state.error, Some(TaskError::fail("second")));
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let now = SystemTime::now();
        let mut entry = entry_at(now);
        StatePatch::new().retry_count(2).loading(true).apply(&mut entry);

        assert_eq!(entry.state.data, Some("cached"));
        assert_eq!(entry.state.retry_count, 2);
        assert!(entry.state.loading);
        assert_eq!(entry.request_id, 1);
        assert_eq!(entry.state.last_updated, Some(now));
    }

    #[test]
    fn test_patch_none_clears_and_request_id_retags() {
        let mut entry = entry_at(SystemTime::now());
        StatePatch::new()
            .data(None)
            .error(None)
            .last_updated(None)
            .request_id(7)
            .apply(&mut entry);

        assert_eq!(entry.state.data, None);
        assert_eq!(entry.state.last_updated, None);
        assert_eq!(entry.request_id, 7);
        assert!(!entry.state.loading);
    }
}
