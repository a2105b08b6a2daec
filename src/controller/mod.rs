//! # Task controller.
//!
//! - [`TaskController`] — runs an action with caching, race control, retries and polling
//! - [`TaskControllerBuilder`] — wires store, bus and configuration
//! - [`TaskConfig`] — per-controller options
//! - [`TaskKey`] — static or argument-derived shared-state key
//! - [`Dependency`] — value compared to decide automatic re-runs

mod builder;
mod config;
mod core;
mod dependency;
mod key;

pub use builder::TaskControllerBuilder;
pub use config::TaskConfig;
pub use core::{RunHandle, TaskController};
pub use dependency::{Dependency, dependencies_changed};
pub use key::{KeyFn, TaskKey};
