//! Record engines: turn one input record into zero or more status updates.
//!
//! The monitor loop is engine-agnostic. The engine is picked once, from the
//! watcher kind, when the monitor is built:
//! - [`RuleEngine`]: stateless regex rules over a sliding [`LogBuffer`](crate::buffer::LogBuffer).
//! - [`CheckEngine`]: a table of named checks folded into one condition.

pub mod checks;
pub mod rules;

pub use checks::{CheckEngine, CheckSeverity, CheckState, CheckTracker};
pub use rules::RuleEngine;

use crate::config::{ConfigError, MonitorConfig};
use crate::types::{Condition, Event, Record};
use crate::watcher::WatcherKind;

/// Events produced for one status update.
///
/// The monitor wraps each emission into a [`Status`](crate::types::Status)
/// together with a copy of the condition set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
    /// Events generated while handling the triggering record.
    pub events: Vec<Event>,
}

/// A record the engine could not use. Logged and skipped by the monitor.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Check output carried none of the severity markers.
    #[error("check {check:?} output has no severity marker: {output:?}")]
    Unclassified {
        /// Check name.
        check: String,
        /// Raw output.
        output: String,
    },
    /// The record kind does not belong to this engine.
    #[error("{engine} engine cannot handle {record} records")]
    UnexpectedRecord {
        /// Engine name.
        engine: &'static str,
        /// Record kind.
        record: &'static str,
    },
    /// The check table could not be serialized into a condition message.
    #[error("failed to serialize check table: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Capability shared by both engines.
pub trait Engine: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Process one record, mutating `conditions` in place.
    ///
    /// Returns one [`Emission`] per status the record should produce, in
    /// emission order. An empty vector means nothing is reported.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when the record cannot be used. No condition is
    /// modified in that case.
    fn process(
        &mut self,
        record: &Record,
        conditions: &mut [Condition],
    ) -> Result<Vec<Emission>, RecordError>;
}

/// Build the engine matching the watcher kind.
///
/// # Errors
///
/// Returns [`ConfigError`] if rules fail to compile.
pub fn build_engine(
    kind: WatcherKind,
    config: &MonitorConfig,
) -> Result<Box<dyn Engine>, ConfigError> {
    match kind {
        WatcherKind::Log => Ok(Box::new(RuleEngine::new(
            config.buffer_size,
            config.compiled_rules()?,
        ))),
        WatcherKind::Check => Ok(Box::new(CheckEngine::new(
            config.check_condition().map(str::to_owned),
        ))),
    }
}

/// Kind name of a record, for logs and errors.
pub(crate) fn record_kind(record: &Record) -> &'static str {
    match record {
        Record::Log(_) => "log",
        Record::Check(_) => "check",
    }
}
