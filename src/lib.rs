//! nodewatch — node-health log monitor.
//!
//! Consumes records from a watcher (tailed log lines or named check reports),
//! matches them against configured rules or tracks checks over time, and
//! emits node condition and event statuses to a downstream aggregator.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Sliding window of recent log records.
pub mod buffer;
/// Condition transitions and dedup.
pub mod condition;
/// Monitor configuration loading and validation.
pub mod config;
/// Rule and check engines.
pub mod engine;
/// Logging setup.
pub mod logging;
/// The monitor loop tying a watcher to a status stream.
pub mod monitor;
/// Core data model.
pub mod types;
/// Record sources.
pub mod watcher;

pub use monitor::{LogMonitor, MonitorError, STATUS_CHANNEL_CAPACITY};
