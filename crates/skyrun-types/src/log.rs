//! Log event model shared by the log store port and the tailer.

use chrono::{DateTime, TimeZone, Utc};

/// One log line from one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Stream the line came from.
    pub stream: String,
    /// Provider-assigned identifier, unique within the stream.
    pub event_id: String,
    /// Event time, epoch milliseconds.
    pub timestamp_ms: i64,
    pub message: String,
}

impl LogEvent {
    /// Event time as UTC, for display.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}
