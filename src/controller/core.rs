use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use futures::future::BoxFuture;
use tokio::{select, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ExecuteError, TaskError},
    events::{Bus, Event, EventKind},
    store::{AsyncState, KeyedStore, StatePatch, Subscription, TaskState},
    tasks::{ActionRef, ExecutionContext},
};

use super::{
    builder::TaskControllerBuilder,
    config::TaskConfig,
    dependency::{Dependency, dependencies_changed},
};

/// Join handle of a background run started by a lifecycle hook.
pub type RunHandle<T> = JoinHandle<Result<Option<T>, ExecuteError>>;

/// Source of store tags; unique across every controller in the process.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Drives one asynchronous action: caching, race control, retries, polling and
/// cross-instance synchronization through a [`KeyedStore`].
///
/// ### Rules
/// - Only the most recently started invocation may commit; older results are discarded.
/// - A fresh cached entry short-circuits `execute` without consuming a generation.
/// - Retries reuse the generation and cancellation token of their invocation.
/// - The next poll is armed only after the previous `execute` resolved.
///
/// Cloning is cheap; clones drive the same controller.
///
/// Lifecycle hooks ([`mount`](Self::mount), [`update_dependencies`](Self::update_dependencies))
/// start background runs and must be called from within a tokio runtime.
pub struct TaskController<A, T> {
    inner: Arc<Inner<A, T>>,
}

impl<A, T> Clone for TaskController<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A, T> {
    action: ActionRef<A, T>,
    config: TaskConfig<A>,
    store: KeyedStore<T>,
    bus: Option<Bus>,

    local: watch::Sender<AsyncState<T>>,
    state: Mutex<ControlState<A>>,
}

/// One started invocation: its local generation and the tag it writes into the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    request_id: u64,
}

struct ControlState<A> {
    generation: u64,
    /// Invocation that has not committed yet.
    in_flight: Option<Ticket>,
    /// Last generation ended by `cancel()`.
    cancelled: Option<u64>,
    token: Option<CancellationToken>,
    poll: Option<CancellationToken>,

    last_args: Option<A>,
    resolved_key: Option<String>,
    subscription: Option<Subscription>,
    dependencies: Vec<Dependency>,

    auto_run: bool,
    mounted: bool,
    unmounted: bool,
}

enum Outcome<T> {
    Cached(Option<T>),
    Succeeded(T),
    Failed,
    Discarded,
}

impl<T> Outcome<T> {
    /// Terminal outcomes re-arm polling; discards do not.
    fn completed(&self) -> bool {
        !matches!(self, Outcome::Discarded)
    }

    fn into_value(self) -> Option<T> {
        match self {
            Outcome::Cached(data) => data,
            Outcome::Succeeded(data) => Some(data),
            Outcome::Failed | Outcome::Discarded => None,
        }
    }
}

impl<A, T> TaskController<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Starts building a controller for `action`.
    pub fn builder(action: ActionRef<A, T>) -> TaskControllerBuilder<A, T> {
        TaskControllerBuilder::new(action)
    }

    /// Creates a controller on the process-wide store without an event bus.
    pub fn new(action: ActionRef<A, T>, config: TaskConfig<A>) -> Self {
        TaskControllerBuilder::new(action).with_config(config).build()
    }

    pub(crate) fn from_parts(
        action: ActionRef<A, T>,
        config: TaskConfig<A>,
        store: KeyedStore<T>,
        bus: Option<Bus>,
    ) -> Self {
        let (local, _) = watch::channel(AsyncState::default());
        let state = ControlState {
            generation: 0,
            in_flight: None,
            cancelled: None,
            token: None,
            poll: None,
            last_args: None,
            resolved_key: None,
            subscription: None,
            dependencies: config.dependencies.clone(),
            auto_run: config.immediate,
            mounted: false,
            unmounted: false,
        };
        Self {
            inner: Arc::new(Inner {
                action,
                config,
                store,
                bus,
                local,
                state: Mutex::new(state),
            }),
        }
    }

    /// Runs the action once for `args`.
    ///
    /// Returns `Ok(Some(data))` on success or cache hit, `Ok(None)` when the invocation
    /// failed terminally or was discarded as stale, and `Err` only when the key could not
    /// be derived from `args`.
    pub async fn execute(&self, args: A) -> Result<Option<T>, ExecuteError> {
        self.inner.execute(args).await
    }

    /// Stops the current invocation from committing and clears the pending poll.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Cancels, removes the shared entry for the resolved key and clears local state.
    pub fn reset(&self) {
        self.inner.cancel();
        if let Some(key) = self.inner.current_key() {
            self.inner.store.delete_state(&key);
        }
        self.inner.local.send_replace(AsyncState::default());

        let key = self.inner.current_key();
        self.inner
            .publish(Event::new(EventKind::TaskReset).with_key_opt(key.as_deref()));
    }

    /// Binds the controller: resolves the key, subscribes and records `args`.
    ///
    /// When auto-run is enabled a background `execute(args)` is started and its handle
    /// returned.
    pub fn mount(&self, args: A) -> Result<Option<RunHandle<T>>, ExecuteError> {
        let key = self.inner.resolve_key(&args)?;
        {
            let mut st = self.inner.lock();
            st.mounted = true;
            st.unmounted = false;
            st.last_args = Some(args.clone());
        }
        self.inner.sync_subscription(key.as_deref());

        Ok(self.inner.auto_run().then(|| self.inner.spawn_execute(args)))
    }

    /// Records new dependency values.
    ///
    /// When any entry differs from the previous list and auto-run is enabled, a
    /// background `execute(args)` is started and its handle returned.
    pub fn update_dependencies(
        &self,
        dependencies: Vec<Dependency>,
        args: A,
    ) -> Result<Option<RunHandle<T>>, ExecuteError> {
        let key = self.inner.resolve_key(&args)?;
        let changed = {
            let mut st = self.inner.lock();
            st.last_args = Some(args.clone());
            if dependencies_changed(&st.dependencies, &dependencies) {
                st.dependencies = dependencies;
                true
            } else {
                false
            }
        };
        self.inner.sync_subscription(key.as_deref());

        Ok((changed && self.inner.auto_run()).then(|| self.inner.spawn_execute(args)))
    }

    /// Enables or disables automatic runs; disabling tears down polling.
    pub fn set_auto_run(&self, enabled: bool) {
        let poll = {
            let mut st = self.inner.lock();
            st.auto_run = enabled;
            if enabled { None } else { st.poll.take() }
        };
        if let Some(poll) = poll {
            poll.cancel();
        }
    }

    /// Unbinds the controller. Later results are discarded.
    pub fn unmount(&self) {
        let (token, poll, subscription, settle) = {
            let mut st = self.inner.lock();
            st.mounted = false;
            st.unmounted = true;
            (
                st.token.take(),
                st.poll.take(),
                st.subscription.take(),
                st.in_flight.take().map(|t| (t.request_id, st.resolved_key.clone())),
            )
        };
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(poll) = poll {
            poll.cancel();
        }
        drop(subscription);
        if let Some((request_id, Some(key))) = settle {
            self.inner.release_store_entry(&key, request_id);
        }
    }

    /// Snapshot of the local state.
    pub fn state(&self) -> AsyncState<T> {
        self.inner.local.borrow().clone()
    }

    /// Receiver notified on every local state change.
    pub fn watch(&self) -> watch::Receiver<AsyncState<T>> {
        self.inner.local.subscribe()
    }

    /// Current request generation; bumped by every started invocation and by `cancel`.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Key the controller is currently bound to.
    pub fn task_key(&self) -> Option<String> {
        self.inner.current_key()
    }

    /// Name of the driven action.
    pub fn name(&self) -> &str {
        self.inner.action.name()
    }

    /// Store shared with other controllers.
    pub fn store(&self) -> &KeyedStore<T> {
        &self.inner.store
    }
}

impl<A, T> Inner<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, ControlState<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev.with_task(self.action.name()));
        }
    }

    fn auto_run(&self) -> bool {
        self.lock().auto_run
    }

    fn resolve_key(&self, args: &A) -> Result<Option<String>, ExecuteError> {
        self.config.task_key.as_ref().map(|k| k.resolve(args)).transpose()
    }

    fn current_key(&self) -> Option<String> {
        let resolved = self.lock().resolved_key.clone();
        resolved.or_else(|| {
            self.config
                .task_key
                .as_ref()
                .and_then(|k| k.as_static())
                .map(str::to_string)
        })
    }

    // Named future type: the polling timer spawns `execute` from inside `execute`.
    fn execute(self: &Arc<Self>, args: A) -> BoxFuture<'static, Result<Option<T>, ExecuteError>> {
        let this = Arc::clone(self);
        Box::pin(async move {
            let outcome = this.run(args).await?;
            if outcome.completed() {
                this.schedule_poll();
            }
            Ok(outcome.into_value())
        })
    }

    fn spawn_execute(self: &Arc<Self>, args: A) -> RunHandle<T> {
        tokio::spawn(self.execute(args))
    }

    async fn run(self: &Arc<Self>, args: A) -> Result<Outcome<T>, ExecuteError> {
        let key = self.resolve_key(&args)?;
        self.sync_subscription(key.as_deref());
        self.lock().last_args = Some(args.clone());

        if let Some(hit) = self.cached(key.as_deref()) {
            let data = hit.data.clone();
            self.local.send_replace(hit);
            self.publish(Event::new(EventKind::CacheHit).with_key_opt(key.as_deref()));
            return Ok(Outcome::Cached(data));
        }

        let (ticket, token) = self.begin(key.as_deref());
        let generation = ticket.generation;
        let mut retries: u32 = 0;

        loop {
            let ctx = ExecutionContext::new(token.clone(), generation, retries);
            let res = self.action.call(args.clone(), ctx).await;

            if let Some(reason) = self.stale_reason(generation, &token) {
                self.discard(key.as_deref(), ticket, reason);
                return Ok(Outcome::Discarded);
            }

            match res {
                Ok(data) => {
                    self.commit(key.as_deref(), ticket, |s, now| s.succeed(data.clone(), now));
                    self.publish(
                        Event::new(EventKind::TaskSucceeded)
                            .with_key_opt(key.as_deref())
                            .with_generation(generation)
                            .with_attempt(retries),
                    );
                    return Ok(Outcome::Succeeded(data));
                }
                Err(TaskError::Canceled) => {
                    self.discard(key.as_deref(), ticket, "cancelled");
                    return Ok(Outcome::Discarded);
                }
                Err(err) => {
                    self.publish(
                        Event::new(EventKind::AttemptFailed)
                            .with_key_opt(key.as_deref())
                            .with_generation(generation)
                            .with_attempt(retries)
                            .with_reason(err.as_message()),
                    );

                    if err.is_retryable() && self.config.retry.allows(retries) {
                        retries += 1;
                        self.publish_retry_count(key.as_deref(), retries);

                        let mut ev = Event::new(EventKind::RetryScheduled)
                            .with_key_opt(key.as_deref())
                            .with_generation(generation)
                            .with_attempt(retries);
                        if let Some(wait) = self.config.retry.delay() {
                            ev = ev.with_delay(wait);
                        }
                        self.publish(ev);

                        if let Some(wait) = self.config.retry.delay() {
                            select! {
                                _ = tokio::time::sleep(wait) => {}
                                _ = token.cancelled() => {
                                    let reason = self.stale_reason(generation, &token).unwrap_or("cancelled");
                                    self.discard(key.as_deref(), ticket, reason);
                                    return Ok(Outcome::Discarded);
                                }
                            }
                        }
                        continue;
                    }

                    self.commit(key.as_deref(), ticket, |s, now| s.fail(err.clone(), retries, now));
                    self.publish(
                        Event::new(EventKind::TaskFailed)
                            .with_key_opt(key.as_deref())
                            .with_generation(generation)
                            .with_attempt(retries)
                            .with_reason(err.as_message()),
                    );
                    return Ok(Outcome::Failed);
                }
            }
        }
    }

    /// Fresh store entry for `key`, if caching is enabled.
    fn cached(&self, key: Option<&str>) -> Option<AsyncState<T>> {
        let key = key?;
        let window = self.config.cache_window()?;
        self.store
            .get_state(key)
            .filter(|entry| entry.is_fresh(window, SystemTime::now()))
            .map(|entry| entry.public())
    }

    /// Supersedes the previous invocation and marks the new one loading.
    ///
    /// A pending poll timer is disarmed; the new run re-arms it when it completes.
    fn begin(&self, key: Option<&str>) -> (Ticket, CancellationToken) {
        let (ticket, token, poll) = {
            let mut st = self.lock();
            if let Some(prev) = st.token.take() {
                prev.cancel();
            }
            st.generation += 1;
            let ticket = Ticket {
                generation: st.generation,
                request_id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            };
            let token = CancellationToken::new();
            st.token = Some(token.clone());
            st.in_flight = Some(ticket);
            (ticket, token, st.poll.take())
        };
        if let Some(poll) = poll {
            poll.cancel();
        }

        self.local.send_modify(AsyncState::begin);
        if let Some(key) = key {
            let snapshot = self.local.borrow().clone();
            self.store.set_state(key, TaskState::tagged(snapshot, ticket.request_id));
        }
        self.publish(
            Event::new(EventKind::ExecuteStarted)
                .with_key_opt(key)
                .with_generation(ticket.generation),
        );
        (ticket, token)
    }

    fn stale_reason(&self, generation: u64, token: &CancellationToken) -> Option<&'static str> {
        let st = self.lock();
        if st.unmounted {
            Some("unmounted")
        } else if st.cancelled == Some(generation) {
            Some("cancelled")
        } else if st.generation != generation {
            Some("superseded")
        } else if token.is_cancelled() {
            Some("cancelled")
        } else {
            None
        }
    }

    /// Drops a result. An invocation that ended itself still owns `loading` and settles it.
    fn discard(&self, key: Option<&str>, ticket: Ticket, reason: &'static str) {
        let owned = {
            let mut st = self.lock();
            if st.in_flight == Some(ticket) {
                st.in_flight = None;
                true
            } else {
                false
            }
        };
        if owned {
            self.local.send_modify(|s| s.loading = false);
            if let Some(key) = key {
                self.release_store_entry(key, ticket.request_id);
            }
        }
        self.publish(
            Event::new(EventKind::ResultDiscarded)
                .with_key_opt(key)
                .with_generation(ticket.generation)
                .with_reason(reason),
        );
    }

    /// Writes the terminal state locally and to the store.
    fn commit<F>(&self, key: Option<&str>, ticket: Ticket, apply: F)
    where
        F: FnOnce(&mut AsyncState<T>, SystemTime),
    {
        {
            let mut st = self.lock();
            if st.in_flight == Some(ticket) {
                st.in_flight = None;
            }
        }
        let now = SystemTime::now();
        self.local.send_modify(|s| apply(s, now));
        if let Some(key) = key {
            let snapshot = self.local.borrow().clone();
            self.store.set_state(key, TaskState::tagged(snapshot, ticket.request_id));
        }
    }

    fn publish_retry_count(&self, key: Option<&str>, retries: u32) {
        self.local.send_modify(|s| s.retry_count = retries);
        if let Some(key) = key {
            self.store
                .update_state(key, StatePatch::new().retry_count(retries));
        }
    }

    /// Clears `loading` on the shared entry if this controller's invocation wrote it last.
    fn release_store_entry(&self, key: &str, request_id: u64) {
        self.store.update_state_if(
            key,
            |entry| entry.request_id == request_id && entry.state.loading,
            StatePatch::new().loading(false),
        );
    }

    fn cancel(&self) {
        let (token, poll, settle, key) = {
            let mut st = self.lock();
            st.cancelled = Some(st.generation);
            st.generation += 1;
            (
                st.token.take(),
                st.poll.take(),
                st.in_flight.take(),
                st.resolved_key.clone(),
            )
        };
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(poll) = poll {
            poll.cancel();
        }
        if let Some(ticket) = settle {
            self.local.send_modify(|s| s.loading = false);
            if let Some(key) = key.as_deref() {
                self.release_store_entry(key, ticket.request_id);
            }
        }
        self.publish(Event::new(EventKind::TaskCancelled).with_key_opt(key.as_deref()));
    }

    /// Keeps the store subscription bound to `key`; a new binding adopts the existing entry.
    fn sync_subscription(self: &Arc<Self>, key: Option<&str>) {
        let previous = {
            let mut st = self.lock();
            st.resolved_key = key.map(str::to_string);
            let current = st.subscription.as_ref().map(Subscription::key);
            if st.unmounted || current == key {
                return;
            }
            st.subscription.take()
        };
        drop(previous);

        let Some(key) = key else { return };
        let weak = Arc::downgrade(self);
        let subscription = self.store.subscribe(key, move |state: &AsyncState<T>| {
            if let Some(inner) = weak.upgrade() {
                inner.local.send_replace(state.clone());
            }
        });
        if let Some(entry) = self.store.get_state(key) {
            self.local.send_replace(entry.public());
        }
        self.lock().subscription = Some(subscription);
    }

    /// Arms one poll timer after a completed `execute`.
    fn schedule_poll(self: &Arc<Self>) {
        let Some(period) = self.config.polling_period() else {
            return;
        };
        let (token, previous) = {
            let mut st = self.lock();
            if !st.mounted || st.unmounted || !st.auto_run || st.last_args.is_none() {
                return;
            }
            let token = CancellationToken::new();
            (token.clone(), st.poll.replace(token))
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
        self.publish(
            Event::new(EventKind::PollScheduled)
                .with_key_opt(self.current_key().as_deref())
                .with_delay(period),
        );

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(period) => {}
            }
            let Some(inner) = weak.upgrade() else { return };
            let args = inner.lock().last_args.clone();
            if let Some(args) = args {
                // Failures land in state; a key error cannot reappear for recorded args.
                let _ = inner.execute(args).await;
            }
        });
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
