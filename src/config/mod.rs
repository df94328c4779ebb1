//! Monitor configuration loading and validation.
//!
//! A monitor is described by a single JSON document. Missing optional fields
//! fall back to defaults; every structural problem is reported as a
//! [`ConfigError`] before anything is started.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::types::ProblemType;

/// Default number of log lines kept in the sliding buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 10;

/// Errors raised while loading or validating a monitor configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read configuration file {}: {source}", .path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`MonitorConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// The config parsed but is semantically invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A rule pattern is not a valid regular expression.
    #[error("invalid pattern {pattern:?} for rule {reason:?}: {source}")]
    Pattern {
        /// Reason of the offending rule.
        reason: String,
        /// The pattern as written.
        pattern: String,
        /// Regex compiler error.
        source: regex::Error,
    },
    /// A watcher plugin is unknown or misconfigured.
    #[error("invalid watcher plugin {plugin:?}: {detail}")]
    Plugin {
        /// Plugin name.
        plugin: String,
        /// What is wrong.
        detail: String,
    },
}

/// Watcher section of the monitor config, inlined at the top level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    /// Watcher plugin name (`filelog` or `sensu`).
    #[serde(default)]
    pub plugin: String,
    /// Plugin-specific options.
    #[serde(default)]
    pub plugin_config: HashMap<String, String>,
    /// File to tail.
    #[serde(default)]
    pub log_path: PathBuf,
    /// How far back to replay existing lines on startup, e.g. `"5m"`.
    #[serde(default)]
    pub lookback: Option<String>,
}

impl WatcherConfig {
    /// Parsed lookback window, if configured.
    pub fn lookback(&self) -> Result<Option<Duration>, ConfigError> {
        self.lookback.as_deref().map(parse_duration).transpose()
    }
}

/// Seed for one condition, always starting out `False`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConditionDefault {
    /// Condition type.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Reason while the condition is healthy.
    pub reason: String,
    /// Message while the condition is healthy.
    #[serde(default)]
    pub message: String,
}

/// A matching rule as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rule {
    /// Temporary or permanent problem.
    #[serde(rename = "type")]
    pub problem_type: ProblemType,
    /// Condition affected by a permanent rule. Ignored for temporary rules.
    #[serde(default)]
    pub condition: String,
    /// Short reason reported on match.
    pub reason: String,
    /// Regular expression; must match through the end of the buffer.
    pub pattern: String,
}

/// A rule with its pattern compiled once at load time.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// The rule as configured.
    pub rule: Rule,
    /// `(?:pattern)$`, anchored to the end of the buffer text.
    pub regex: Regex,
}

impl CompiledRule {
    /// Compile `rule`, anchoring the pattern to the end of the text.
    pub fn compile(rule: Rule) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("(?:{})$", rule.pattern)).map_err(|source| {
            ConfigError::Pattern {
                reason: rule.reason.clone(),
                pattern: rule.pattern.clone(),
                source,
            }
        })?;
        Ok(Self { rule, regex })
    }
}

/// Top-level monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Watcher plugin settings.
    #[serde(flatten)]
    pub watcher: WatcherConfig,
    /// Sliding log buffer capacity.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Source name echoed into every status.
    #[serde(default)]
    pub source: String,
    /// Initial conditions.
    #[serde(default)]
    pub default_conditions: Vec<ConditionDefault>,
    /// Matching rules, evaluated in order.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Condition driven by the check engine; first default condition if unset.
    #[serde(default)]
    pub check_condition: Option<String>,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl MonitorConfig {
    /// Parse a config from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] or [`ConfigError::Pattern`] when validation fails.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every structural invariant of the config.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "bufferSize must be positive".to_owned(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("source must not be empty".to_owned()));
        }

        let mut types = HashSet::new();
        for default in &self.default_conditions {
            if !types.insert(default.condition_type.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate condition type {:?}",
                    default.condition_type
                )));
            }
        }

        for rule in &self.rules {
            if rule.reason.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rule with pattern {:?} has an empty reason",
                    rule.pattern
                )));
            }
            if rule.problem_type == ProblemType::Permanent
                && !types.contains(rule.condition.as_str())
            {
                return Err(ConfigError::Invalid(format!(
                    "permanent rule {:?} references unknown condition {:?}",
                    rule.reason, rule.condition
                )));
            }
            CompiledRule::compile(rule.clone())?;
        }

        if let Some(check) = &self.check_condition {
            if !types.contains(check.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "checkCondition references unknown condition {check:?}"
                )));
            }
        }

        self.watcher.lookback()?;
        Ok(())
    }

    /// Compile every rule, preserving configured order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] for the first invalid pattern.
    pub fn compiled_rules(&self) -> Result<Vec<CompiledRule>, ConfigError> {
        self.rules.iter().cloned().map(CompiledRule::compile).collect()
    }

    /// Condition type the check engine drives.
    pub fn check_condition(&self) -> Option<&str> {
        self.check_condition.as_deref().or_else(|| {
            self.default_conditions
                .first()
                .map(|c| c.condition_type.as_str())
        })
    }
}

/// Load, default, and validate a monitor config file.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
pub fn load_monitor_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = MonitorConfig::from_json(&contents)?;
    tracing::info!(
        path = %path.display(),
        source = %config.source,
        plugin = %config.watcher.plugin,
        rules = config.rules.len(),
        "loaded monitor config"
    );
    Ok(config)
}

/// Suffix to seconds multiplier.
const UNITS: &[(&str, u64)] = &[("s", 1), ("m", 60), ("h", 3600), ("d", 86_400)];

/// Parse durations like `"30s"`, `"5m"`, `"2h"`, `"1d"`, or `"500ms"`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for unknown suffixes or non-numeric values.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::Invalid(format!("invalid duration {s:?}"));

    if let Some(value) = s.strip_suffix("ms") {
        return value.parse().map(Duration::from_millis).map_err(|_| invalid());
    }

    for (suffix, multiplier) in UNITS {
        if let Some(value) = s.strip_suffix(suffix) {
            let value: u64 = value.parse().map_err(|_| invalid())?;
            let secs = value.checked_mul(*multiplier).ok_or_else(invalid)?;
            return Ok(Duration::from_secs(secs));
        }
    }

    Err(invalid())
}
