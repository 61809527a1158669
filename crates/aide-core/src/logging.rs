//! Recent-log capture for the daemon's `/logs` endpoint.
//!
//! [`LogCollector`] is a `tracing` layer that keeps the most recent events,
//! with their structured fields, in a bounded ring buffer. [`LogReader`] is
//! the read side handed to the IPC server.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Capacity used by the CLI and daemon.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// One captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    /// `TRACE` through `ERROR`.
    pub level: String,
    pub target: String,
    pub message: String,
    /// Every non-message field, formatted.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug)]
struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

/// A `tracing` layer that captures events into a shared ring buffer.
#[derive(Debug, Clone)]
pub struct LogCollector {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl LogCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(LogBuffer {
                entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                capacity,
            })),
        }
    }

    pub fn reader(&self) -> LogReader {
        LogReader {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl Default for LogCollector {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl<S: Subscriber> Layer<S> for LogCollector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            time: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        };
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(entry);
        }
    }
}

/// Read handle for the captured entries.
#[derive(Debug, Clone)]
pub struct LogReader {
    buffer: Arc<Mutex<LogBuffer>>,
}

impl LogReader {
    /// All captured entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.recent(usize::MAX, None)
    }

    /// The newest `limit` entries at or above `min_level`, oldest first.
    pub fn recent(&self, limit: usize, min_level: Option<Level>) -> Vec<LogEntry> {
        let Ok(buf) = self.buffer.lock() else {
            return Vec::new();
        };
        let mut selected: Vec<LogEntry> = buf
            .entries
            .iter()
            .rev()
            .filter(|e| match min_level {
                // More severe levels compare as smaller.
                Some(min) => e.level.parse::<Level>().is_ok_and(|level| level <= min),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }
}
