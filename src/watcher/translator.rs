//! Raw line to [`Record`] translation.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::types::{CheckRecord, LogRecord, Record};

/// Plugin option: regex capturing the timestamp in group 1.
pub const TIMESTAMP_KEY: &str = "timestamp";
/// Plugin option: regex capturing the message in group 1.
pub const MESSAGE_KEY: &str = "message";
/// Plugin option: chrono format of the captured timestamp.
pub const TIMESTAMP_FORMAT_KEY: &str = "timestampFormat";

/// A line that could not be turned into a record.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// A required field was not found in the line.
    #[error("no {field} found in line {line:?}")]
    Missing {
        /// Which field.
        field: &'static str,
        /// The raw line.
        line: String,
    },
    /// The timestamp did not parse with the configured format.
    #[error("failed to parse timestamp {value:?} with format {format:?}")]
    Timestamp {
        /// Captured timestamp text.
        value: String,
        /// Configured format.
        format: String,
    },
    /// The line is not a valid JSON check report.
    #[error("failed to decode check report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Converts one raw line into a record.
pub trait Translator: Send + Sync + 'static {
    /// Translate `line`.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError`] if the line does not fit the expected format.
    fn translate(&self, line: &str) -> Result<Record, TranslateError>;
}

fn require<'a>(
    plugin: &str,
    config: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, ConfigError> {
    match config.get(key).map(String::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Plugin {
            plugin: plugin.to_owned(),
            detail: format!("pluginConfig.{key} is required"),
        }),
    }
}

fn compile(plugin: &str, key: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Plugin {
        plugin: plugin.to_owned(),
        detail: format!("pluginConfig.{key} is not a valid regex: {e}"),
    })
}

/// Parse `value` with a chrono `format`.
///
/// Zoned formats are converted to UTC. Zone-less values are taken as UTC.
/// Formats without a year (classic syslog) get the current year.
pub fn parse_timestamp(value: &str, format: &str) -> Result<DateTime<Utc>, TranslateError> {
    let value = value.trim();
    if let Ok(zoned) = DateTime::parse_from_str(value, format) {
        return Ok(zoned.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
        return Ok(naive.and_utc());
    }
    if !format.contains("%Y") {
        let year = Utc::now().year();
        let with_year = format!("{year} {value}");
        if let Ok(naive) = NaiveDateTime::parse_from_str(&with_year, &format!("%Y {format}")) {
            return Ok(naive.and_utc());
        }
    }
    Err(TranslateError::Timestamp {
        value: value.to_owned(),
        format: format.to_owned(),
    })
}

/// `filelog` translator: regexes pick the timestamp and message out of a line.
#[derive(Debug, Clone)]
pub struct RegexTranslator {
    timestamp: Regex,
    message: Regex,
    timestamp_format: String,
}

impl RegexTranslator {
    /// Build from `timestamp`, `message`, and `timestampFormat` plugin options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Plugin`] if an option is missing or invalid.
    pub fn from_plugin_config(config: &HashMap<String, String>) -> Result<Self, ConfigError> {
        const PLUGIN: &str = "filelog";
        Ok(Self {
            timestamp: compile(PLUGIN, TIMESTAMP_KEY, require(PLUGIN, config, TIMESTAMP_KEY)?)?,
            message: compile(PLUGIN, MESSAGE_KEY, require(PLUGIN, config, MESSAGE_KEY)?)?,
            timestamp_format: require(PLUGIN, config, TIMESTAMP_FORMAT_KEY)?.to_owned(),
        })
    }
}

impl Translator for RegexTranslator {
    fn translate(&self, line: &str) -> Result<Record, TranslateError> {
        let captured = |re: &Regex, field: &'static str| {
            re.captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_owned())
                .ok_or_else(|| TranslateError::Missing {
                    field,
                    line: line.to_owned(),
                })
        };

        let timestamp = parse_timestamp(
            &captured(&self.timestamp, "timestamp")?,
            &self.timestamp_format,
        )?;
        let message = captured(&self.message, "message")?;

        Ok(Record::Log(LogRecord { timestamp, message }))
    }
}

/// One Sensu client log line. Only the fields we use are decoded.
#[derive(Debug, Deserialize)]
struct SensuLogLine {
    timestamp: String,
    #[serde(default)]
    payload: SensuPayload,
}

#[derive(Debug, Default, Deserialize)]
struct SensuPayload {
    #[serde(default)]
    check: SensuCheck,
}

#[derive(Debug, Default, Deserialize)]
struct SensuCheck {
    #[serde(default)]
    name: String,
    #[serde(default)]
    output: String,
}

/// `sensu` translator: decodes Sensu client JSON log lines into check records.
#[derive(Debug, Clone)]
pub struct SensuTranslator {
    timestamp_format: String,
}

impl SensuTranslator {
    /// Build from the `timestampFormat` plugin option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Plugin`] if the option is missing.
    pub fn from_plugin_config(config: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Ok(Self {
            timestamp_format: require("sensu", config, TIMESTAMP_FORMAT_KEY)?.to_owned(),
        })
    }
}

impl Translator for SensuTranslator {
    fn translate(&self, line: &str) -> Result<Record, TranslateError> {
        let decoded: SensuLogLine = serde_json::from_str(line)?;
        if decoded.payload.check.name.is_empty() {
            return Err(TranslateError::Missing {
                field: "check name",
                line: line.to_owned(),
            });
        }
        let timestamp = parse_timestamp(&decoded.timestamp, &self.timestamp_format)?;

        Ok(Record::Check(CheckRecord {
            timestamp,
            check_name: decoded.payload.check.name,
            output: decoded.payload.check.output,
        }))
    }
}
