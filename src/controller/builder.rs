use crate::{events::Bus, store::KeyedStore, tasks::ActionRef};

use super::{config::TaskConfig, core::TaskController};

/// Builder for a [`TaskController`] with optional features.
pub struct TaskControllerBuilder<A, T> {
    action: ActionRef<A, T>,
    config: TaskConfig<A>,
    store: Option<KeyedStore<T>>,
    bus: Option<Bus>,
}

impl<A, T> TaskControllerBuilder<A, T>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates a builder with the default configuration.
    pub fn new(action: ActionRef<A, T>) -> Self {
        Self {
            action,
            config: TaskConfig::default(),
            store: None,
            bus: None,
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: TaskConfig<A>) -> Self {
        self.config = config;
        self
    }

    /// Shares state through `store` instead of the process-wide store for `T`.
    ///
    /// Controllers only see each other's results when they use the same store.
    pub fn with_store(mut self, store: KeyedStore<T>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publishes lifecycle events to `bus`.
    ///
    /// Without a bus the controller emits nothing.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Builds the controller.
    pub fn build(self) -> TaskController<A, T> {
        let store = self.store.unwrap_or_else(KeyedStore::global);
        TaskController::from_parts(self.action, self.config, store, self.bus)
    }
}
