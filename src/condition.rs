//! Condition state machine.
//!
//! A condition is `True`/`False` crossed with a reason. Only a change of
//! status or reason counts as a transition; the message is always overwritten
//! so it reflects the latest evaluation.

use chrono::{DateTime, Utc};

use crate::config::ConditionDefault;
use crate::types::{Condition, ConditionStatus, Event, EventSeverity};

/// Seed the condition set from configured defaults.
///
/// Every condition starts `False` with its default reason and message, and
/// `now` as its transition time.
pub fn initial_conditions(defaults: &[ConditionDefault], now: DateTime<Utc>) -> Vec<Condition> {
    defaults
        .iter()
        .map(|d| Condition {
            condition_type: d.condition_type.clone(),
            status: ConditionStatus::False,
            reason: d.reason.clone(),
            message: d.message.clone(),
            last_transition_time: now,
        })
        .collect()
}

/// Apply one evaluation outcome to `condition`.
///
/// Returns the change event when status or reason changed. In that case
/// `last_transition_time` becomes `timestamp`; otherwise it is left alone.
pub fn apply(
    condition: &mut Condition,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    timestamp: DateTime<Utc>,
) -> Option<Event> {
    let transitioned = condition.status != status || condition.reason != reason;

    condition.status = status;
    condition.reason = reason.to_owned();
    condition.message = message.to_owned();

    if !transitioned {
        return None;
    }

    condition.last_transition_time = timestamp;
    Some(condition_change_event(
        &condition.condition_type,
        status,
        reason,
        timestamp,
    ))
}

/// Event announcing that a condition moved to a new status/reason.
pub fn condition_change_event(
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    timestamp: DateTime<Utc>,
) -> Event {
    Event {
        severity: EventSeverity::Info,
        timestamp,
        reason: reason.to_owned(),
        message: format!("Node condition {condition_type} is now: {status}, reason: {reason}"),
    }
}

/// Find a condition by type.
pub fn find_mut<'a>(conditions: &'a mut [Condition], condition_type: &str) -> Option<&'a mut Condition> {
    conditions
        .iter_mut()
        .find(|c| c.condition_type == condition_type)
}
