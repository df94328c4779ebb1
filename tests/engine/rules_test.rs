//! Tests for `src/engine/rules.rs` — rule evaluation over the log buffer.

use chrono::{DateTime, TimeZone, Utc};
use nodewatch::buffer::LogBuffer;
use nodewatch::condition::initial_conditions;
use nodewatch::config::MonitorConfig;
use nodewatch::engine::rules::evaluate;
use nodewatch::engine::{build_engine, Engine, RuleEngine};
use nodewatch::types::{ConditionStatus, EventSeverity, LogRecord, Record};
use nodewatch::watcher::WatcherKind;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

fn log(secs: i64, message: &str) -> Record {
    Record::Log(LogRecord {
        timestamp: at(secs),
        message: message.to_owned(),
    })
}

fn kernel_config() -> MonitorConfig {
    MonitorConfig::from_json(
        r#"{
            "source": "kernel-monitor",
            "bufferSize": 3,
            "defaultConditions": [
                {"type": "KernelDeadlock", "reason": "KernelHasNoDeadlock", "message": "kernel has no deadlock"},
                {"type": "ReadonlyFilesystem", "reason": "FilesystemIsNotReadOnly"}
            ],
            "rules": [
                {"type": "temporary", "reason": "OOMKilling", "pattern": "Kill process \\d+ (.+) score \\d+ or sacrifice child\\nKilled process \\d+ (.+) total-vm:\\d+kB.*"},
                {"type": "permanent", "condition": "KernelDeadlock", "reason": "DockerHung", "pattern": "task docker:\\w+ blocked for more than \\w+ seconds\\."},
                {"type": "permanent", "condition": "ReadonlyFilesystem", "reason": "FilesystemIsReadOnly", "pattern": "Remounting filesystem read-only"}
            ]
        }"#,
    )
    .expect("valid config")
}

fn engine(config: &MonitorConfig) -> RuleEngine {
    RuleEngine::new(config.buffer_size, config.compiled_rules().expect("rules"))
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[test]
fn evaluate_skips_rules_without_match() {
    let config = kernel_config();
    let rules = config.compiled_rules().expect("rules");
    let mut buffer = LogBuffer::new(config.buffer_size);
    buffer.push(LogRecord {
        timestamp: at(1),
        message: "EXT4-fs error: Remounting filesystem read-only".to_owned(),
    });

    let matches = evaluate(&buffer, &rules);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule.rule.reason, "FilesystemIsReadOnly");
    assert_eq!(matches[0].records.len(), 1);
}

#[test]
fn oom_kill_spanning_two_lines_is_one_temporary_event() {
    let config = kernel_config();
    let mut engine = engine(&config);
    let mut conditions = initial_conditions(&config.default_conditions, at(0));
    let before = conditions.clone();

    let first = engine
        .process(
            &log(1, "Kill process 1012 (java) score 955 or sacrifice child"),
            &mut conditions,
        )
        .expect("process");
    assert!(first.is_empty());

    let second = engine
        .process(
            &log(2, "Killed process 1012 (java) total-vm:2048kB, anon-rss:1024kB"),
            &mut conditions,
        )
        .expect("process");

    assert_eq!(second.len(), 1);
    let event = &second[0].events[0];
    assert_eq!(event.severity, EventSeverity::Warn);
    assert_eq!(event.reason, "OOMKilling");
    assert_eq!(
        event.message,
        "Kill process 1012 (java) score 955 or sacrifice child\nKilled process 1012 (java) total-vm:2048kB, anon-rss:1024kB"
    );
    assert_eq!(conditions, before, "temporary rules never touch conditions");
}

#[test]
fn permanent_rules_only_touch_their_condition() {
    let config = kernel_config();
    let mut engine = engine(&config);
    let mut conditions = initial_conditions(&config.default_conditions, at(0));

    let emissions = engine
        .process(
            &log(5, "INFO: task docker:1234 blocked for more than 120 seconds."),
            &mut conditions,
        )
        .expect("process");

    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0].events.len(), 1);
    assert_eq!(conditions[0].status, ConditionStatus::True);
    assert_eq!(conditions[0].reason, "DockerHung");
    assert_eq!(conditions[0].last_transition_time, at(5));
    assert_eq!(conditions[1].status, ConditionStatus::False);
    assert_eq!(conditions[1].last_transition_time, at(0));
}

#[test]
fn buffer_never_exceeds_configured_size() {
    let config = kernel_config();
    let mut engine = engine(&config);
    let mut conditions = initial_conditions(&config.default_conditions, at(0));

    for i in 0..10 {
        engine
            .process(&log(i, &format!("line {i}")), &mut conditions)
            .expect("process");
        assert!(engine.buffer().len() <= 3);
    }
    let kept: Vec<_> = engine.buffer().iter().map(|r| r.message.clone()).collect();
    assert_eq!(kept, vec!["line 7", "line 8", "line 9"]);
}

#[test]
fn build_engine_picks_rule_engine_for_log_watchers() {
    let engine = build_engine(WatcherKind::Log, &kernel_config()).expect("engine");
    assert_eq!(engine.name(), "rule");
}
