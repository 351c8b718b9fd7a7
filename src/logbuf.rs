//! Log entries queued for the next update frame.

use serde::Serialize;

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message.
    Info,
    /// Something the operator should look at.
    Error,
}

/// One message forwarded to consoles in the `out` array of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Message text.
    pub msg: String,
    /// Severity, serialized as `type`.
    #[serde(rename = "type")]
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
}

impl LogEntry {
    /// Create an entry stamped with the current wall-clock time.
    pub fn now(severity: Severity, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            severity,
            time: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Entries waiting to be flushed into an update frame.
///
/// Every entry is also written to the `log` facade when pushed.
#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: Vec<LogEntry>,
}

impl LogBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an informational entry.
    pub fn push_info(&mut self, msg: impl Into<String>) {
        let entry = LogEntry::now(Severity::Info, msg);
        log::info!("[Bridge] {}", entry.msg);
        self.entries.push(entry);
    }

    /// Queue an error entry.
    pub fn push_error(&mut self, msg: impl Into<String>) {
        let entry = LogEntry::now(Severity::Error, msg);
        log::error!("[Bridge] {}", entry.msg);
        self.entries.push(entry);
    }

    /// Take all pending entries, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
