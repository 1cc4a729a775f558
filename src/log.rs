//! Structured Batch Log
//!
//! Warnings and errors raised while processing work items, kept as data
//! (not just printed) so the report can say which replicate lost which
//! metric and why. Every entry is mirrored to `tracing`.
//!
//! Each work item writes into its own `BatchLog`; the orchestrator merges
//! them in work-item order, so the final log does not depend on execution
//! order.

use serde::Serialize;

use crate::records::WorkKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Work item the entry belongs to (None for run-level messages)
    pub item: Option<WorkKey>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchLog {
    entries: Vec<LogEntry>,
}

impl BatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, item: Option<&WorkKey>, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(item = ?item.map(|k| k.to_string()), "{}", message);
        self.push(LogLevel::Info, item, message);
    }

    pub fn warn(&mut self, item: Option<&WorkKey>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(item = ?item.map(|k| k.to_string()), "{}", message);
        self.push(LogLevel::Warn, item, message);
    }

    pub fn error(&mut self, item: Option<&WorkKey>, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(item = ?item.map(|k| k.to_string()), "{}", message);
        self.push(LogLevel::Error, item, message);
    }

    fn push(&mut self, level: LogLevel, item: Option<&WorkKey>, message: String) {
        self.entries.push(LogEntry {
            level,
            item: item.cloned(),
            message,
        });
    }

    /// Append another log's entries (keeps their order)
    pub fn merge(&mut self, other: BatchLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Period, ReplicateId, SamplingMethod};

    #[test]
    fn test_merge_keeps_order_and_counts() {
        let key = WorkKey {
            replicate: ReplicateId::new(2017, "P1"),
            period: Period::Pre,
            sampling_method: SamplingMethod::Pollen,
        };

        let mut first = BatchLog::new();
        first.warn(Some(&key), "network too small");
        let mut second = BatchLog::new();
        second.error(None, "bad wiring");
        second.info(None, "done");

        first.merge(second);
        assert_eq!(first.entries().len(), 3);
        assert_eq!(first.entries()[0].item.as_ref(), Some(&key));
        assert_eq!(first.entries()[1].level, LogLevel::Error);
        assert_eq!(first.count(LogLevel::Warn), 1);
        assert_eq!(first.count(LogLevel::Info), 1);
    }
}
