//! # Keyed state store with synchronous per-key fan-out.
//!
//! Maintains the latest [`TaskState`] for every task key and the ordered list of
//! listeners interested in that key.
//!
//! ## Architecture
//! ```text
//! TaskController A ──set_state(key)──┐
//! TaskController B ──update_state────┼──► KeyedStore ──► entries:   HashMap<key, TaskState>
//! TaskController C ──delete_state────┘         │
//!                                              └──────► listeners: HashMap<key, [(id, fn)]>
//!                                                             │  (subscription order)
//!                                                             ▼
//!                                                 listener(&AsyncState)  ← request_id stripped
//! ```
//!
//! ## Rules
//! - Every `set_state` notifies every current listener of the key exactly once (no de-dup)
//! - `update_state` never creates an entry
//! - `delete_state` notifies a fresh initial state ("cache cleared")
//! - Listeners run **outside** the internal lock, so they may read or write the store
//! - Notifications are delivered in write order, across threads too: a write queues its
//!   notification under the lock and one caller at a time drains the queue. A write made
//!   from inside a listener is delivered after the notification currently running.
//! - Removing the last listener of a key drops the per-key list

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use once_cell::sync::Lazy;

use super::state::{AsyncState, StatePatch, TaskState};

/// Callback invoked with the public projection of a key's new state.
pub type Listener<T> = Arc<dyn Fn(&AsyncState<T>) + Send + Sync>;

/// Process-wide stores, one per value type.
static GLOBAL_STORES: Lazy<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

struct Inner<T> {
    entries: HashMap<String, TaskState<T>>,
    listeners: HashMap<String, Vec<(u64, Listener<T>)>>,
    next_listener_id: u64,
    /// Notifications written but not delivered yet, in write order.
    pending: VecDeque<Delivery<T>>,
    /// Some caller is delivering `pending`.
    draining: bool,
}

struct Delivery<T> {
    listeners: Vec<Listener<T>>,
    state: AsyncState<T>,
}

/// Shared, in-memory map from task key to its latest state.
///
/// Cheap to clone: clones share the same entries and listeners. Use
/// [`KeyedStore::global`] for the process-wide instance or [`KeyedStore::new`]
/// for an isolated one (tests, independent task families).
pub struct KeyedStore<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for KeyedStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for KeyedStore<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                listeners: HashMap::new(),
                next_listener_id: 0,
                pending: VecDeque::new(),
                draining: false,
            })),
        }
    }
}

impl<T> std::fmt::Debug for KeyedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("KeyedStore")
            .field("entries", &inner.entries.len())
            .field("listened_keys", &inner.listeners.len())
            .finish()
    }
}

impl<T> KeyedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty, isolated store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide store for values of type `T`.
    ///
    /// Every call with the same `T` returns a handle to the same store.
    pub fn global() -> Self {
        let mut stores = GLOBAL_STORES
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores
            .get(&TypeId::of::<T>())
            .and_then(|s| s.downcast_ref::<Self>())
        {
            return store.clone();
        }
        let store = Self::new();
        stores.insert(TypeId::of::<T>(), Box::new(store.clone()));
        store
    }

    /// Returns a copy of the entry for `key`, if any.
    pub fn get_state(&self, key: &str) -> Option<TaskState<T>> {
        lock(&self.inner).entries.get(key).cloned()
    }

    /// Overwrites the entry for `key` and notifies its listeners.
    pub fn set_state(&self, key: &str, state: TaskState<T>) {
        let public = state.public();
        let mut inner = lock(&self.inner);
        inner.entries.insert(key.to_string(), state);
        dispatch(&self.inner, inner, key, public);
    }

    /// Shallow-merges `patch` into the entry for `key` and notifies its listeners.
    ///
    /// Returns `false` (and does nothing) if there is no entry for `key`.
    pub fn update_state(&self, key: &str, patch: StatePatch<T>) -> bool {
        self.update_state_if(key, |_| true, patch)
    }

    /// Like [`update_state`](Self::update_state), but only when `predicate` accepts the
    /// current entry. Check and write happen under one lock.
    pub fn update_state_if<P>(&self, key: &str, predicate: P, patch: StatePatch<T>) -> bool
    where
        P: FnOnce(&TaskState<T>) -> bool,
    {
        let mut inner = lock(&self.inner);
        let Some(entry) = inner.entries.get_mut(key) else {
            return false;
        };
        if !predicate(&*entry) {
            return false;
        }
        patch.apply(entry);
        let public = entry.public();
        dispatch(&self.inner, inner, key, public);
        true
    }

    /// Removes the entry for `key` and notifies listeners with a fresh initial state.
    ///
    /// Listeners are notified even if no entry existed.
    pub fn delete_state(&self, key: &str) -> Option<TaskState<T>> {
        let mut inner = lock(&self.inner);
        let removed = inner.entries.remove(key);
        dispatch(&self.inner, inner, key, TaskState::<T>::initial(0).public());
        removed
    }

    /// Registers `listener` for changes of `key`.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(&AsyncState<T>) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_listener_id;
            inner.next_listener_id += 1;
            inner
                .listeners
                .entry(key.to_string())
                .or_default()
                .push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        let owned_key = key.to_string();
        Subscription {
            key: key.to_string(),
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    remove_listener(&inner, &owned_key, id);
                }
            })),
        }
    }

    /// Number of listeners currently registered for `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        lock(&self.inner)
            .listeners
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Returns `true` if any listener list exists for `key`.
    pub fn has_listeners(&self, key: &str) -> bool {
        lock(&self.inner).listeners.contains_key(key)
    }

    /// Sorted list of keys that currently have an entry.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.inner).entries.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Deletes every entry (each key's listeners receive an initial state).
    pub fn clear(&self) {
        for key in self.keys() {
            self.delete_state(&key);
        }
    }
}

/// Handle to a registered store listener.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    key: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Key this subscription listens to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Removes the listener from the store.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.release.is_some())
            .finish()
    }
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn listeners_of<T>(inner: &Inner<T>, key: &str) -> Vec<Listener<T>> {
    inner
        .listeners
        .get(key)
        .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
        .unwrap_or_default()
}

fn notify<T>(listeners: &[Listener<T>], state: &AsyncState<T>) {
    for listener in listeners {
        listener(state);
    }
}

/// Queues the notification for `key` while the write lock is still held, then delivers
/// the queue unless another caller is already doing so.
fn dispatch<'a, T>(
    shared: &'a Mutex<Inner<T>>,
    mut inner: MutexGuard<'a, Inner<T>>,
    key: &str,
    state: AsyncState<T>,
) {
    let listeners = listeners_of(&inner, key);
    if !listeners.is_empty() {
        inner.pending.push_back(Delivery { listeners, state });
    }
    if inner.draining || inner.pending.is_empty() {
        return;
    }
    inner.draining = true;

    let mut guard = DrainGuard {
        shared,
        finished: false,
    };
    loop {
        let Some(next) = inner.pending.pop_front() else {
            break;
        };
        drop(inner);
        notify(&next.listeners, &next.state);
        inner = lock(shared);
    }
    inner.draining = false;
    guard.finished = true;
}

/// Hands draining over to the next writer if a listener panics.
struct DrainGuard<'a, T> {
    shared: &'a Mutex<Inner<T>>,
    finished: bool,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            lock(self.shared).draining = false;
        }
    }
}

fn remove_listener<T>(inner: &Mutex<Inner<T>>, key: &str, id: u64) {
    let mut inner = lock(inner);
    let now_empty = match inner.listeners.get_mut(key) {
        Some(list) => {
            list.retain(|(lid, _)| *lid != id);
            list.is_empty()
        }
        None => false,
    };
    if now_empty {
        inner.listeners.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::time::SystemTime;

    fn recorder<T: Clone + Send + 'static>() -> (
        Arc<Mutex<Vec<AsyncState<T>>>>,
        impl Fn(&AsyncState<T>) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |s: &AsyncState<T>| sink.lock().unwrap().push(s.clone()))
    }

    fn success(value: u32) -> TaskState<u32> {
        let mut state = AsyncState::default();
        state.succeed(value, SystemTime::now());
        TaskState::tagged(state, 9)
    }

    #[test]
    fn test_set_state_notifies_without_dedup() {
        let store = KeyedStore::<u32>::new();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("k", listener);

        store.set_state("k", success(1));
        store.set_state("k", success(1));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].data, Some(1));
        assert_eq!(store.get_state("k").unwrap().request_id, 9);
    }

    #[test]
    fn test_listeners_only_see_their_key() {
        let store = KeyedStore::<u32>::new();
        let (a_seen, a) = recorder();
        let (b_seen, b) = recorder();
        let _a = store.subscribe("a", a);
        let _b = store.subscribe("b", b);

        store.set_state("a", success(1));

        assert_eq!(a_seen.lock().unwrap().len(), 1);
        assert!(b_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delivery_follows_subscription_order() {
        let store = KeyedStore::<u32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<Subscription> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                store.subscribe("k", move |_| order.lock().unwrap().push(i))
            })
            .collect();

        store.set_state("k", success(5));

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_update_state_never_creates_entries() {
        let store = KeyedStore::<u32>::new();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("missing", listener);

        assert!(!store.update_state("missing", StatePatch::new().loading(true)));
        assert!(store.get_state("missing").is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_state_merges_and_notifies() {
        let store = KeyedStore::<u32>::new();
        store.set_state("k", success(3));
        let (seen, listener) = recorder();
        let _sub = store.subscribe("k", listener);

        assert!(store.update_state(
            "k",
            StatePatch::new().error(Some(TaskError::fail("x"))).retry_count(1)
        ));

        let entry = store.get_state("k").unwrap();
        assert_eq!(entry.state.data, Some(3));
        assert_eq!(entry.state.retry_count, 1);
        assert_eq!(seen.lock().unwrap()[0].error, Some(TaskError::fail("x")));
    }

    #[test]
    fn test_delete_state_notifies_initial_state() {
        let store = KeyedStore::<u32>::new();
        store.set_state("k", success(3));
        let (seen, listener) = recorder();
        let _sub = store.subscribe("k", listener);

        let removed = store.delete_state("k");

        assert_eq!(removed.unwrap().state.data, Some(3));
        assert!(store.get_state("k").is_none());
        assert_eq!(seen.lock().unwrap()[0], AsyncState::default());
    }

    #[test]
    fn test_last_unsubscribe_releases_key() {
        let store = KeyedStore::<u32>::new();
        let first = store.subscribe("k", |_| {});
        let second = store.subscribe("k", |_| {});
        assert_eq!(store.subscriber_count("k"), 2);

        first.unsubscribe();
        assert_eq!(store.subscriber_count("k"), 1);

        drop(second);
        assert_eq!(store.subscriber_count("k"), 0);
        assert!(!store.has_listeners("k"));
    }

    #[test]
    fn test_listener_may_read_store() {
        let store = KeyedStore::<u32>::new();
        let reader = store.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe("k", move |_| {
            *sink.lock().unwrap() = reader.get_state("k").map(|e| e.request_id);
        });

        store.set_state("k", success(1));

        assert_eq!(*seen.lock().unwrap(), Some(9));
    }

    #[test]
    fn test_nested_write_is_delivered_after_current_one() {
        let store = KeyedStore::<u32>::new();
        let writer = store.clone();
        let _echo = store.subscribe("k", move |s: &AsyncState<u32>| {
            if s.data == Some(1) {
                writer.set_state("k", success(2));
            }
        });
        let (seen, listener) = recorder();
        let _sub = store.subscribe("k", listener);

        store.set_state("k", success(1));

        let data: Vec<_> = seen.lock().unwrap().iter().map(|s| s.data).collect();
        assert_eq!(data, vec![Some(1), Some(2)]);
        assert_eq!(store.get_state("k").unwrap().state.data, Some(2));
    }

    #[test]
    fn test_concurrent_writers_notify_in_write_order() {
        const WRITERS: u32 = 4;
        const WRITES: u32 = 200;

        let store = KeyedStore::<u32>::new();
        let (seen, listener) = recorder();
        let _sub = store.subscribe("k", listener);

        let handles: Vec<_> = (0..WRITERS)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..WRITES {
                        store.set_state("k", success(w * 1_000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), (WRITERS * WRITES) as usize);
        assert_eq!(seen.last().unwrap().data, store.get_state("k").unwrap().state.data);
        for w in 0..WRITERS {
            let own: Vec<u32> = seen
                .iter()
                .filter_map(|s| s.data)
                .filter(|v| v / 1_000 == w)
                .collect();
            assert!(own.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn test_update_state_if_checks_under_lock() {
        let store = KeyedStore::<u32>::new();
        store.set_state("k", success(3));
        let (seen, listener) = recorder();
        let _sub = store.subscribe("k", listener);

        assert!(!store.update_state_if("k", |e| e.request_id == 1, StatePatch::new().retry_count(5)));
        assert_eq!(store.get_state("k").unwrap().state.retry_count, 0);
        assert!(seen.lock().unwrap().is_empty());

        assert!(store.update_state_if("k", |e| e.request_id == 9, StatePatch::new().retry_count(5)));
        assert_eq!(store.get_state("k").unwrap().state.retry_count, 5);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_global_is_shared_per_type() {
        #[derive(Clone)]
        struct OnlyHere(u8);

        let a = KeyedStore::<OnlyHere>::global();
        let b = KeyedStore::<OnlyHere>::global();
        let mut state = AsyncState::default();
        state.succeed(OnlyHere(4), SystemTime::now());
        a.set_state("shared", TaskState::tagged(state, 1));

        let entry = b.get_state("shared").unwrap();
        assert_eq!(entry.state.data.map(|v| v.0), Some(4));
        assert!(KeyedStore::<u32>::new().get_state("shared").is_none());
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = KeyedStore::<u32>::new();
        store.set_state("b", success(1));
        store.set_state("a", success(2));
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);

        store.clear();
        assert!(store.keys().is_empty());
    }
}
