//! Fixed-capacity sliding window of recent log records.
//!
//! Problems often span several lines (a stack trace, an OOM kill report), so
//! rules are matched against the buffered window rather than a single line.

use std::collections::VecDeque;

use regex::Regex;

use crate::types::LogRecord;

/// Ring of the most recent log records, oldest first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    records: VecDeque<LogRecord>,
    capacity: usize,
}

impl LogBuffer {
    /// Create an empty buffer holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one when full.
    pub fn push(&mut self, record: LogRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    /// Match `regex` against the buffer text and return the matched records.
    ///
    /// The buffer text is every message joined with `\n`. `regex` is expected
    /// to be anchored to the end of the text (see
    /// [`CompiledRule`](crate::config::CompiledRule)), so any match includes
    /// the newest line. Candidate windows are tried from the newest line
    /// backward and the latest-starting match wins. Returns the records from
    /// the line where that match starts through the newest, or an empty
    /// vector when nothing matches.
    pub fn match_pattern(&self, regex: &Regex) -> Vec<LogRecord> {
        if self.records.is_empty() {
            return Vec::new();
        }

        let mut text = String::new();
        let mut starts = Vec::with_capacity(self.records.len());
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            starts.push(text.len());
            text.push_str(&record.message);
        }

        for (line, &offset) in starts.iter().enumerate().rev() {
            let Some(found) = regex.find_at(&text, offset) else {
                continue;
            };
            // A hit from `offset` never starts before this line, and every
            // later line already failed, so the match starts on this line.
            debug_assert!(found.start() >= offset);
            return self.records.iter().skip(line).cloned().collect();
        }

        Vec::new()
    }
}
