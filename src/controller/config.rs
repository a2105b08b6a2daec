use std::fmt;
use std::time::Duration;

use super::dependency::Dependency;
use super::key::TaskKey;
use crate::policies::RetryPolicy;

/// Configuration of a [`TaskController`](crate::TaskController).
///
/// Zero durations disable their feature:
/// - `polling_interval == 0` → no polling
/// - `cache_time == 0` → every `execute` runs the action
pub struct TaskConfig<A> {
    /// Run automatically on mount and when dependencies change (also gates polling).
    pub immediate: bool,
    /// Values compared on [`update_dependencies`](crate::TaskController::update_dependencies).
    pub dependencies: Vec<Dependency>,
    /// Delay between a completed run and the next automatic one.
    pub polling_interval: Duration,
    /// Retries after the first failed attempt.
    pub retry: RetryPolicy,
    /// Window during which a stored result under the same key is reused.
    pub cache_time: Duration,
    /// Shared-state key; `None` keeps the controller private.
    pub task_key: Option<TaskKey<A>>,
}

impl<A> TaskConfig<A> {
    /// Polling period, if polling is enabled.
    pub fn polling_period(&self) -> Option<Duration> {
        (!self.polling_interval.is_zero()).then_some(self.polling_interval)
    }

    /// Cache window, if caching is enabled.
    pub fn cache_window(&self) -> Option<Duration> {
        (!self.cache_time.is_zero()).then_some(self.cache_time)
    }

    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shorthand for [`with_retry`](Self::with_retry) without a delay.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn with_task_key(mut self, key: impl Into<TaskKey<A>>) -> Self {
        self.task_key = Some(key.into());
        self
    }
}

impl<A> Default for TaskConfig<A> {
    fn default() -> Self {
        Self {
            immediate: true,
            dependencies: Vec::new(),
            polling_interval: Duration::ZERO,
            retry: RetryPolicy::none(),
            cache_time: Duration::ZERO,
            task_key: None,
        }
    }
}

impl<A> Clone for TaskConfig<A> {
    fn clone(&self) -> Self {
        Self {
            immediate: self.immediate,
            dependencies: self.dependencies.clone(),
            polling_interval: self.polling_interval,
            retry: self.retry,
            cache_time: self.cache_time,
            task_key: self.task_key.clone(),
        }
    }
}

impl<A> fmt::Debug for TaskConfig<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskConfig")
            .field("immediate", &self.immediate)
            .field("dependencies", &self.dependencies)
            .field("polling_interval", &self.polling_interval)
            .field("retry", &self.retry)
            .field("cache_time", &self.cache_time)
            .field("task_key", &self.task_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TaskConfig::<()>::default();
        assert!(cfg.immediate);
        assert!(cfg.polling_period().is_none());
        assert!(cfg.cache_window().is_none());
        assert_eq!(cfg.retry, RetryPolicy::none());
        assert!(cfg.task_key.is_none());
    }

    #[test]
    fn test_builders_enable_windows() {
        let cfg = TaskConfig::<u32>::default()
            .with_immediate(false)
            .with_polling_interval(Duration::from_millis(250))
            .with_cache_time(Duration::from_secs(5))
            .with_max_retries(2)
            .with_task_key("k");
        assert!(!cfg.immediate);
        assert_eq!(cfg.polling_period(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.cache_window(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.task_key.and_then(|k| k.as_static().map(str::to_string)).as_deref(), Some("k"));
    }
}
