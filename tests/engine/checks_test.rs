//! Tests for `src/engine/checks.rs` — named check tracking.

use chrono::{DateTime, TimeZone, Utc};
use nodewatch::condition::initial_conditions;
use nodewatch::config::MonitorConfig;
use nodewatch::engine::checks::{
    ALL_CHECKS_PASSED, CHECK_FAILED, CHECK_RECOVERED, SOME_CHECKS_FAILED,
};
use nodewatch::engine::{build_engine, CheckEngine, CheckSeverity, Engine, RecordError};
use nodewatch::types::{CheckRecord, Condition, ConditionStatus, LogRecord, Record};
use nodewatch::watcher::WatcherKind;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn check(secs: i64, name: &str, output: &str) -> Record {
    Record::Check(CheckRecord {
        timestamp: at(secs),
        check_name: name.to_owned(),
        output: output.to_owned(),
    })
}

fn sensu_config() -> MonitorConfig {
    MonitorConfig::from_json(
        r#"{
            "plugin": "sensu",
            "source": "sensu-monitor",
            "defaultConditions": [
                {"type": "SensuChecks", "reason": "AllChecksPassed", "message": "All checks passed"}
            ]
        }"#,
    )
    .expect("valid config")
}

fn setup() -> (CheckEngine, Vec<Condition>) {
    let config = sensu_config();
    let engine = CheckEngine::new(config.check_condition().map(str::to_owned));
    let conditions = initial_conditions(&config.default_conditions, at(0));
    (engine, conditions)
}

// ---------------------------------------------------------------------------
// Table lifecycle
// ---------------------------------------------------------------------------

#[test]
fn critical_then_ok_creates_and_removes_entry() {
    let (mut engine, mut conditions) = setup();

    let emissions = engine
        .process(&check(1, "disk", "CRITICAL: disk full"), &mut conditions)
        .expect("process");
    assert_eq!(emissions.len(), 1);
    assert_eq!(
        engine.tracker().get("disk").map(|s| s.severity),
        Some(CheckSeverity::Critical)
    );
    assert_eq!(conditions[0].status, ConditionStatus::True);
    assert_eq!(conditions[0].reason, SOME_CHECKS_FAILED);

    let reasons: Vec<_> = emissions[0].events.iter().map(|e| e.reason.as_str()).collect();
    assert_eq!(reasons, vec![CHECK_FAILED, SOME_CHECKS_FAILED]);

    let emissions = engine
        .process(&check(2, "disk", "OK"), &mut conditions)
        .expect("process");
    assert!(engine.tracker().is_empty());
    assert_eq!(conditions[0].status, ConditionStatus::False);
    assert_eq!(conditions[0].reason, ALL_CHECKS_PASSED);
    assert_eq!(conditions[0].last_transition_time, at(2));

    let reasons: Vec<_> = emissions[0].events.iter().map(|e| e.reason.as_str()).collect();
    assert_eq!(reasons, vec![CHECK_RECOVERED, ALL_CHECKS_PASSED]);
}

#[test]
fn identical_report_emits_events_once() {
    let (mut engine, mut conditions) = setup();

    let first = engine
        .process(&check(1, "disk", "CRITICAL: disk full"), &mut conditions)
        .expect("process");
    let second = engine
        .process(&check(2, "disk", "CRITICAL: disk full"), &mut conditions)
        .expect("process");

    assert!(!first[0].events.is_empty());
    assert_eq!(second.len(), 1, "every classified report yields a status");
    assert!(second[0].events.is_empty());
    assert_eq!(conditions[0].last_transition_time, at(1));
}

#[test]
fn condition_message_is_sorted_snapshot() {
    let (mut engine, mut conditions) = setup();
    engine
        .process(&check(1, "mem", "WARN: 85% used"), &mut conditions)
        .expect("process");
    engine
        .process(&check(2, "disk", "CRITICAL: 99% used"), &mut conditions)
        .expect("process");

    let snapshot: serde_json::Value =
        serde_json::from_str(&conditions[0].message).expect("message is JSON");
    assert_eq!(snapshot[0]["checkName"], "disk");
    assert_eq!(snapshot[0]["severity"], "CRITICAL");
    assert_eq!(snapshot[1]["checkName"], "mem");
    assert_eq!(snapshot[1]["output"], "WARN: 85% used");
}

#[test]
fn condition_stays_true_while_any_check_fails() {
    let (mut engine, mut conditions) = setup();
    for (i, name) in ["a", "b"].iter().enumerate() {
        let secs = i64::try_from(i).expect("small index");
        engine
            .process(&check(secs, name, "CRITICAL"), &mut conditions)
            .expect("process");
    }

    engine
        .process(&check(10, "a", "OK"), &mut conditions)
        .expect("process");
    assert_eq!(conditions[0].status, ConditionStatus::True);

    engine
        .process(&check(11, "b", "OK"), &mut conditions)
        .expect("process");
    assert_eq!(conditions[0].status, ConditionStatus::False);
}

#[test]
fn severity_change_is_one_event_without_transition() {
    let (mut engine, mut conditions) = setup();
    engine
        .process(&check(1, "disk", "WARN: 80%"), &mut conditions)
        .expect("process");
    let emissions = engine
        .process(&check(2, "disk", "CRITICAL: 95%"), &mut conditions)
        .expect("process");

    assert_eq!(emissions[0].events.len(), 1);
    assert_eq!(emissions[0].events[0].reason, CHECK_FAILED);
    assert!(emissions[0].events[0].message.contains("CRITICAL"));
}

// ---------------------------------------------------------------------------
// Rejected records
// ---------------------------------------------------------------------------

#[test]
fn unclassifiable_output_changes_nothing() {
    let (mut engine, mut conditions) = setup();
    engine
        .process(&check(1, "disk", "CRITICAL"), &mut conditions)
        .expect("process");
    let before = conditions.clone();

    let err = engine
        .process(&check(2, "disk", "check timed out"), &mut conditions)
        .expect_err("no marker");
    assert!(matches!(err, RecordError::Unclassified { .. }));
    assert_eq!(conditions, before);
    assert_eq!(engine.tracker().len(), 1);
}

#[test]
fn log_records_are_rejected() {
    let (mut engine, mut conditions) = setup();
    let record = Record::Log(LogRecord {
        timestamp: at(0),
        message: "CRITICAL".to_owned(),
    });
    assert!(engine.process(&record, &mut conditions).is_err());
}

#[test]
fn build_engine_picks_check_engine_for_check_watchers() {
    let engine = build_engine(WatcherKind::Check, &sensu_config()).expect("engine");
    assert_eq!(engine.name(), "check");
}
