//! Rule matching over the sliding log buffer.

use tracing::{debug, warn};

use crate::buffer::LogBuffer;
use crate::condition;
use crate::config::CompiledRule;
use crate::engine::{record_kind, Emission, Engine, RecordError};
use crate::types::{Condition, ConditionStatus, Event, EventSeverity, LogRecord, ProblemType, Record};

/// One rule that matched, with the records that participated.
#[derive(Debug, Clone)]
pub struct RuleMatch<'a> {
    /// The matching rule.
    pub rule: &'a CompiledRule,
    /// Matched records, oldest first. Never empty.
    pub records: Vec<LogRecord>,
}

/// Evaluate every rule against the buffer, in configured order.
///
/// Rules with no match are skipped; several rules may match at once.
pub fn evaluate<'a>(buffer: &LogBuffer, rules: &'a [CompiledRule]) -> Vec<RuleMatch<'a>> {
    rules
        .iter()
        .filter_map(|rule| {
            let records = buffer.match_pattern(&rule.regex);
            (!records.is_empty()).then_some(RuleMatch { rule, records })
        })
        .collect()
}

/// Join matched record messages into one event/condition message.
pub fn generate_message(records: &[LogRecord]) -> String {
    records
        .iter()
        .map(|r| r.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Engine for free-form log lines.
#[derive(Debug)]
pub struct RuleEngine {
    buffer: LogBuffer,
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Create an engine with an empty buffer of `buffer_size` lines.
    pub fn new(buffer_size: usize, rules: Vec<CompiledRule>) -> Self {
        Self {
            buffer: LogBuffer::new(buffer_size),
            rules,
        }
    }

    /// Current buffer contents.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    fn emission_for(
        m: &RuleMatch<'_>,
        log: &LogRecord,
        conditions: &mut [Condition],
    ) -> Emission {
        let rule = &m.rule.rule;
        let message = generate_message(&m.records);

        match rule.problem_type {
            ProblemType::Temporary => Emission {
                events: vec![Event {
                    severity: EventSeverity::Warn,
                    timestamp: log.timestamp,
                    reason: rule.reason.clone(),
                    message,
                }],
            },
            ProblemType::Permanent => {
                let Some(target) = condition::find_mut(conditions, &rule.condition) else {
                    warn!(
                        condition = %rule.condition,
                        reason = %rule.reason,
                        "permanent rule targets unknown condition"
                    );
                    return Emission::default();
                };
                let events = condition::apply(
                    target,
                    ConditionStatus::True,
                    &rule.reason,
                    &message,
                    log.timestamp,
                )
                .into_iter()
                .collect();
                Emission { events }
            }
        }
    }
}

impl Engine for RuleEngine {
    fn name(&self) -> &'static str {
        "rule"
    }

    fn process(
        &mut self,
        record: &Record,
        conditions: &mut [Condition],
    ) -> Result<Vec<Emission>, RecordError> {
        let Record::Log(log) = record else {
            return Err(RecordError::UnexpectedRecord {
                engine: self.name(),
                record: record_kind(record),
            });
        };

        self.buffer.push(log.clone());

        let emissions: Vec<Emission> = evaluate(&self.buffer, &self.rules)
            .iter()
            .map(|m| {
                debug!(reason = %m.rule.rule.reason, lines = m.records.len(), "rule matched");
                Self::emission_for(m, log, conditions)
            })
            .collect();

        Ok(emissions)
    }
}
