//! Stateful tracking of named checks reported by a monitoring agent.
//!
//! The table only holds failing checks. A check enters on its first `WARN` or
//! `CRITICAL` report and leaves when it reports `OK`, so an absent entry means
//! the check is passing. The whole table folds into one condition: `True`
//! while anything is failing, `False` once it is empty.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::condition;
use crate::engine::{record_kind, Emission, Engine, RecordError};
use crate::types::{CheckRecord, Condition, ConditionStatus, Event, EventSeverity, Record};

/// Reason while no check is failing.
pub const ALL_CHECKS_PASSED: &str = "AllChecksPassed";
/// Reason while at least one check is failing.
pub const SOME_CHECKS_FAILED: &str = "SomeChecksFailed";
/// Message while no check is failing.
pub const ALL_CHECKS_PASSED_MESSAGE: &str = "All checks passed";
/// Event reason for a check that started failing or changed severity.
pub const CHECK_FAILED: &str = "CheckFailed";
/// Event reason for a check that recovered.
pub const CHECK_RECOVERED: &str = "CheckRecovered";

/// Severity parsed from check output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckSeverity {
    /// Passing.
    #[serde(rename = "OK")]
    Ok,
    /// Degraded.
    #[serde(rename = "WARN")]
    Warn,
    /// Failing.
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl CheckSeverity {
    /// Scan output for `CRITICAL`, `WARN`, `OK`, in that priority.
    ///
    /// Markers are case-sensitive. Returns `None` when none is present.
    pub fn classify(output: &str) -> Option<Self> {
        if output.contains("CRITICAL") {
            Some(Self::Critical)
        } else if output.contains("WARN") {
            Some(Self::Warn)
        } else if output.contains("OK") {
            Some(Self::Ok)
        } else {
            None
        }
    }
}

impl fmt::Display for CheckSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Warn => f.write_str("WARN"),
            Self::Critical => f.write_str("CRITICAL"),
        }
    }
}

/// Last known state of a failing check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckState {
    /// Check name.
    pub check_name: String,
    /// Last reported severity; never `Ok` inside the table.
    pub severity: CheckSeverity,
    /// Time of the last report.
    pub timestamp: DateTime<Utc>,
    /// Output of the last report.
    pub output: String,
}

/// What an update did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckChange {
    /// A check started failing.
    Added(CheckState),
    /// A failing check changed severity.
    Changed {
        /// Severity before the update.
        previous: CheckSeverity,
        /// Entry after the update.
        current: CheckState,
    },
    /// A failing check reported `OK`. Carries the recovering output.
    Removed {
        /// Entry as it was before removal.
        last: CheckState,
        /// Output of the `OK` report.
        output: String,
    },
}

impl CheckChange {
    /// Event describing this change.
    pub fn to_event(&self, timestamp: DateTime<Utc>) -> Event {
        match self {
            Self::Added(state) | Self::Changed { current: state, .. } => Event {
                severity: EventSeverity::Warn,
                timestamp,
                reason: CHECK_FAILED.to_owned(),
                message: format!(
                    "check {} is {}: {}",
                    state.check_name, state.severity, state.output
                ),
            },
            Self::Removed { last, output } => Event {
                severity: EventSeverity::Info,
                timestamp,
                reason: CHECK_RECOVERED.to_owned(),
                message: format!("check {} recovered: {output}", last.check_name),
            },
        }
    }
}

/// Instance-owned table of failing checks, keyed and ordered by name.
#[derive(Debug, Clone, Default)]
pub struct CheckTracker {
    table: BTreeMap<String, CheckState>,
}

impl CheckTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check result.
    ///
    /// Returns the change when the table changed: an entry was added,
    /// removed, or changed severity. Refreshing an entry with the same
    /// severity updates its timestamp and output but returns `None`.
    pub fn update(
        &mut self,
        check_name: &str,
        severity: CheckSeverity,
        timestamp: DateTime<Utc>,
        output: &str,
    ) -> Option<CheckChange> {
        if severity == CheckSeverity::Ok {
            return self
                .table
                .remove(check_name)
                .map(|last| CheckChange::Removed {
                    last,
                    output: output.to_owned(),
                });
        }

        let current = CheckState {
            check_name: check_name.to_owned(),
            severity,
            timestamp,
            output: output.to_owned(),
        };

        match self.table.insert(check_name.to_owned(), current.clone()) {
            None => Some(CheckChange::Added(current)),
            Some(previous) if previous.severity != severity => Some(CheckChange::Changed {
                previous: previous.severity,
                current,
            }),
            Some(_) => None,
        }
    }

    /// Entry for a check, if it is failing.
    pub fn get(&self, check_name: &str) -> Option<&CheckState> {
        self.table.get(check_name)
    }

    /// Number of failing checks.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether every check is passing.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// JSON array of all entries, ordered by check name.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the table cannot be encoded.
    pub fn snapshot(&self) -> Result<String, serde_json::Error> {
        let entries: Vec<&CheckState> = self.table.values().collect();
        serde_json::to_string(&entries)
    }

    /// Aggregate `(status, reason, message)` for the tracked condition.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the snapshot cannot be encoded.
    pub fn aggregate(&self) -> Result<(ConditionStatus, &'static str, String), serde_json::Error> {
        if self.table.is_empty() {
            return Ok((
                ConditionStatus::False,
                ALL_CHECKS_PASSED,
                ALL_CHECKS_PASSED_MESSAGE.to_owned(),
            ));
        }
        Ok((ConditionStatus::True, SOME_CHECKS_FAILED, self.snapshot()?))
    }
}

/// Engine for named check reports.
#[derive(Debug)]
pub struct CheckEngine {
    tracker: CheckTracker,
    condition_type: Option<String>,
}

impl CheckEngine {
    /// Create an engine driving `condition_type`, if any.
    pub fn new(condition_type: Option<String>) -> Self {
        Self {
            tracker: CheckTracker::new(),
            condition_type,
        }
    }

    /// The check table.
    pub fn tracker(&self) -> &CheckTracker {
        &self.tracker
    }

    fn handle(
        &mut self,
        check: &CheckRecord,
        conditions: &mut [Condition],
    ) -> Result<Emission, RecordError> {
        let severity =
            CheckSeverity::classify(&check.output).ok_or_else(|| RecordError::Unclassified {
                check: check.check_name.clone(),
                output: check.output.clone(),
            })?;

        let change =
            self.tracker
                .update(&check.check_name, severity, check.timestamp, &check.output);
        let (status, reason, message) = self.tracker.aggregate()?;

        debug!(
            check = %check.check_name,
            severity = %severity,
            changed = change.is_some(),
            failing = self.tracker.len(),
            "check updated"
        );

        let mut events: Vec<Event> = change
            .iter()
            .map(|c| c.to_event(check.timestamp))
            .collect();

        if let Some(ty) = self.condition_type.as_deref() {
            if let Some(target) = condition::find_mut(conditions, ty) {
                events.extend(condition::apply(
                    target,
                    status,
                    reason,
                    &message,
                    check.timestamp,
                ));
            }
        }

        Ok(Emission { events })
    }
}

impl Engine for CheckEngine {
    fn name(&self) -> &'static str {
        "check"
    }

    fn process(
        &mut self,
        record: &Record,
        conditions: &mut [Condition],
    ) -> Result<Vec<Emission>, RecordError> {
        let Record::Check(check) = record else {
            return Err(RecordError::UnexpectedRecord {
                engine: self.name(),
                record: record_kind(record),
            });
        };
        self.handle(check, conditions).map(|emission| vec![emission])
    }
}
