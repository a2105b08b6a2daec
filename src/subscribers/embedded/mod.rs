//! # Built-in subscribers
//!
//! - [`LogWriter`]: forwards events to `tracing` (enable with the `logging` feature).

mod log;

pub use log::LogWriter;
