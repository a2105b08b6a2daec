//! # Task keys.
//!
//! A [`TaskKey`] names the task family a controller belongs to. Controllers that resolve
//! the same key share one store entry: they read each other's results and honour the
//! cache window.
//!
//! - [`TaskKey::Static`] — one fixed key for every call.
//! - [`TaskKey::Derived`] — computed from the call arguments on every `execute`.
//!
//! Keys are compared by their resolved string value, never by function identity.

use std::fmt;
use std::sync::Arc;

use crate::error::ExecuteError;

/// Key derivation function.
pub type KeyFn<A> = Arc<dyn Fn(&A) -> anyhow::Result<String> + Send + Sync>;

/// Key specification of a controller.
pub enum TaskKey<A> {
    /// Fixed key.
    Static(String),
    /// Key computed from the arguments of each call.
    Derived(KeyFn<A>),
}

impl<A> TaskKey<A> {
    /// Fixed key.
    pub fn fixed(key: impl Into<String>) -> Self {
        TaskKey::Static(key.into())
    }

    /// Infallible derived key.
    ///
    /// ```
    /// use tasksync::TaskKey;
    ///
    /// let key = TaskKey::derive(|id: &u32| format!("user:{id}"));
    /// assert_eq!(key.resolve(&7).unwrap(), "user:7");
    /// ```
    pub fn derive<F>(f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        TaskKey::Derived(Arc::new(move |args| Ok(f(args))))
    }

    /// Fallible derived key; an error is returned by `execute` as
    /// [`ExecuteError::KeyDerivation`].
    pub fn try_derive<F>(f: F) -> Self
    where
        F: Fn(&A) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        TaskKey::Derived(Arc::new(f))
    }

    /// Resolves the key for `args`.
    pub fn resolve(&self, args: &A) -> Result<String, ExecuteError> {
        match self {
            TaskKey::Static(key) => Ok(key.clone()),
            TaskKey::Derived(f) => f(args).map_err(|source| ExecuteError::KeyDerivation { source }),
        }
    }

    /// Returns the key if it does not depend on arguments.
    pub fn as_static(&self) -> Option<&str> {
        match self {
            TaskKey::Static(key) => Some(key),
            TaskKey::Derived(_) => None,
        }
    }
}

impl<A> Clone for TaskKey<A> {
    fn clone(&self) -> Self {
        match self {
            TaskKey::Static(key) => TaskKey::Static(key.clone()),
            TaskKey::Derived(f) => TaskKey::Derived(Arc::clone(f)),
        }
    }
}

impl<A> fmt::Debug for TaskKey<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Static(key) => f.debug_tuple("Static").field(key).finish(),
            TaskKey::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

impl<A> From<&str> for TaskKey<A> {
    fn from(key: &str) -> Self {
        TaskKey::fixed(key)
    }
}

impl<A> From<String> for TaskKey<A> {
    fn from(key: String) -> Self {
        TaskKey::Static(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_ignores_args() {
        let key: TaskKey<u32> = "users".into();
        assert_eq!(key.resolve(&1).unwrap(), "users");
        assert_eq!(key.resolve(&2).unwrap(), "users");
        assert_eq!(key.as_static(), Some("users"));
    }

    #[test]
    fn test_derived_resolves_actual_value() {
        let key = TaskKey::derive(|(org, id): &(String, u32)| format!("{org}/{id}"));
        assert_eq!(key.resolve(&("acme".into(), 1)).unwrap(), "acme/1");
        assert_eq!(key.resolve(&("acme".into(), 2)).unwrap(), "acme/2");
        assert!(key.as_static().is_none());
    }

    #[test]
    fn test_failed_derivation_maps_to_execute_error() {
        let key = TaskKey::try_derive(|id: &Option<u32>| match id {
            Some(id) => Ok(format!("item:{id}")),
            None => Err(anyhow::anyhow!("id required")),
        });
        let err = key.resolve(&None).unwrap_err();
        assert_eq!(err.as_label(), "execute_key_derivation");
        assert_eq!(key.resolve(&Some(3)).unwrap(), "item:3");
    }
}
