//! Tests for `src/watcher/file.rs` — tailing real files through both plugins.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use nodewatch::config::MonitorConfig;
use nodewatch::types::{ConditionStatus, Record};
use nodewatch::watcher::{create_watcher, WatcherError, WatcherKind};
use nodewatch::LogMonitor;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn filelog_config(path: &Path, lookback: Option<&str>) -> MonitorConfig {
    let mut value = serde_json::json!({
        "plugin": "filelog",
        "pluginConfig": {
            "timestamp": "^(\\S+)",
            "message": "^\\S+ (.*)",
            "timestampFormat": "%Y-%m-%dT%H:%M:%S%z"
        },
        "logPath": path,
        "source": "kernel-monitor",
        "defaultConditions": [{"type": "KernelDeadlock", "reason": "KernelHasNoDeadlock"}],
        "rules": [{"type": "permanent", "condition": "KernelDeadlock", "reason": "OOPS", "pattern": "kernel: Oops.*"}]
    });
    if let Some(lookback) = lookback {
        value["lookback"] = serde_json::Value::from(lookback);
    }
    MonitorConfig::from_json(&value.to_string()).expect("valid config")
}

fn sensu_config(path: &Path) -> MonitorConfig {
    let value = serde_json::json!({
        "plugin": "sensu",
        "pluginConfig": {"timestampFormat": "%Y-%m-%dT%H:%M:%S%.f%z"},
        "logPath": path,
        "lookback": "1h",
        "source": "sensu-monitor",
        "defaultConditions": [{"type": "SensuChecks", "reason": "AllChecksPassed"}]
    });
    MonitorConfig::from_json(&value.to_string()).expect("valid config")
}

fn stamp(age: chrono::Duration) -> String {
    (Utc::now() - age).format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

fn append(path: &Path, line: &str) {
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for append");
    writeln!(f, "{line}").expect("append");
}

async fn next<T>(rx: &mut mpsc::Receiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting")
        .expect("channel closed")
}

// ---------------------------------------------------------------------------
// filelog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn without_lookback_only_new_lines_are_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kern.log");
    std::fs::write(&path, format!("{} old line\n", stamp(chrono::Duration::zero()))).expect("write");

    let config = filelog_config(&path, None);
    let mut watcher = create_watcher(&config.watcher).expect("watcher");
    assert_eq!(watcher.kind(), WatcherKind::Log);
    let mut records = watcher.watch().expect("watch");

    append(&path, &format!("{} fresh line", stamp(chrono::Duration::zero())));
    let Record::Log(record) = next(&mut records).await else {
        panic!("expected a log record");
    };
    assert_eq!(record.message, "fresh line");

    watcher.stop();
}

#[tokio::test]
async fn lookback_drops_records_older_than_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kern.log");
    std::fs::write(
        &path,
        format!(
            "{} too old\nnot a log line\n{} recent enough\n",
            stamp(chrono::Duration::hours(2)),
            stamp(chrono::Duration::minutes(10)),
        ),
    )
    .expect("write");

    let config = filelog_config(&path, Some("1h"));
    let mut watcher = create_watcher(&config.watcher).expect("watcher");
    let mut records = watcher.watch().expect("watch");

    let Record::Log(record) = next(&mut records).await else {
        panic!("expected a log record");
    };
    assert_eq!(record.message, "recent enough");

    watcher.stop();
}

#[tokio::test]
async fn missing_file_fails_to_watch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = filelog_config(&dir.path().join("absent.log"), None);
    let mut watcher = create_watcher(&config.watcher).expect("watcher");
    assert!(matches!(watcher.watch(), Err(WatcherError::Open { .. })));
}

#[tokio::test]
async fn file_backed_monitor_reports_oops() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kern.log");
    std::fs::write(&path, "").expect("write");

    let config = filelog_config(&path, None);
    let watcher = create_watcher(&config.watcher).expect("watcher");
    let mut monitor = LogMonitor::new(config, watcher).expect("monitor");
    let mut statuses = monitor.start().expect("start");
    next(&mut statuses).await;

    append(
        &path,
        &format!("{} kernel: Oops: 0002 [#1] SMP", stamp(chrono::Duration::zero())),
    );
    let status = next(&mut statuses).await;
    assert_eq!(status.conditions[0].status, ConditionStatus::True);
    assert_eq!(status.conditions[0].reason, "OOPS");
    assert_eq!(status.conditions[0].message, "kernel: Oops: 0002 [#1] SMP");

    monitor.stop().await;
}

// ---------------------------------------------------------------------------
// sensu
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sensu_lines_become_check_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sensu-client.log");
    let line = serde_json::json!({
        "timestamp": Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f%z").to_string(),
        "level": "info",
        "message": "publishing check result",
        "payload": {"check": {"name": "check_disk", "output": "CRITICAL: /var 97% used", "status": 2}}
    });
    std::fs::write(&path, format!("{line}\n{{\"level\":\"info\"}}\n")).expect("write");

    let config = sensu_config(&path);
    let mut watcher = create_watcher(&config.watcher).expect("watcher");
    assert_eq!(watcher.kind(), WatcherKind::Check);
    let mut records = watcher.watch().expect("watch");

    let Record::Check(record) = next(&mut records).await else {
        panic!("expected a check record");
    };
    assert_eq!(record.check_name, "check_disk");
    assert_eq!(record.output, "CRITICAL: /var 97% used");

    watcher.stop();
}
