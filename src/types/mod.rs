//! Core data model shared by watchers, engines, and the monitor loop.
//!
//! Records flow in from a watcher, conditions and events flow out inside a
//! [`Status`]. Records, events, and statuses are single-owner values consumed
//! once; conditions live for the monitor's lifetime and are copied into every
//! emitted status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized log line produced by a log watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
    /// Message body with any timestamp/prefix already stripped.
    pub message: String,
}

/// A single report about a named check from a check-oriented watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    /// When the check result was reported.
    pub timestamp: DateTime<Utc>,
    /// Name of the check.
    pub check_name: String,
    /// Raw check output; carries the severity marker.
    pub output: String,
}

/// Anything a watcher can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Free-form log line.
    Log(LogRecord),
    /// Named check report.
    Check(CheckRecord),
}

impl Record {
    /// Timestamp of the underlying record.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Log(log) => log.timestamp,
            Self::Check(check) => check.timestamp,
        }
    }
}

/// Whether a rule match is transient or changes a standing condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    /// Only emits an event.
    Temporary,
    /// Drives a condition to `True`.
    Permanent,
}

/// Boolean status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The problem is present.
    True,
    /// The problem is absent.
    False,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("True"),
            Self::False => f.write_str("False"),
        }
    }
}

/// A long-lived named health indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within a monitor.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Current status.
    pub status: ConditionStatus,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable detail from the latest evaluation.
    pub message: String,
    /// Last time status or reason changed.
    pub last_transition_time: DateTime<Utc>,
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational, e.g. a condition change.
    Info,
    /// Something went wrong.
    Warn,
}

/// A point-in-time notification. Never revisited once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Event severity.
    pub severity: EventSeverity,
    /// When the triggering record happened.
    pub timestamp: DateTime<Utc>,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
}

/// Snapshot emitted to the downstream aggregator.
///
/// `events` holds exactly the events produced while handling the triggering
/// record. `conditions` is an owned copy of the monitor's condition set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Monitor source name.
    pub source: String,
    /// Events generated by the triggering record.
    pub events: Vec<Event>,
    /// Copy of every condition at emission time.
    pub conditions: Vec<Condition>,
}
