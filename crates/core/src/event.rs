use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// Marker that starts the stack-trace part of a Java-style log message.
const STACK_TRACE_MARKER: &str = " at ";

/// One log record as shipped by a log forwarder.
///
/// The wire key for the timestamp is `@timestamp`; it serializes back as
/// `timestamp` so templates can refer to it by a plain name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub input_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename(deserialize = "@timestamp"))]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub beat: Beat,
}

/// Shipper metadata attached to each event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Beat {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hostname: String,
}

impl LogEvent {
    /// Whether the event is older than `max_age` relative to `now`.
    pub fn is_older_than(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        let max_age = Duration::from_std(max_age).unwrap_or(Duration::MAX);
        now.signed_duration_since(self.timestamp) > max_age
    }

    /// The message cut before its first stack-trace line.
    pub fn short_message(&self) -> &str {
        match self.message.find(STACK_TRACE_MARKER) {
            Some(idx) => &self.message[..idx],
            None => &self.message,
        }
    }

    /// Short title derived from the source path: the part after `prefix` up to
    /// the first following `.`.
    ///
    /// `/data/logs/billing.2017-02-10.log` with prefix `/data/logs/` gives
    /// `billing`. Without the prefix the whole source is used as the start.
    pub fn source_title(&self, prefix: &str) -> &str {
        let start = match self.source.find(prefix) {
            Some(idx) if !prefix.is_empty() => idx + prefix.len(),
            _ => 0,
        };
        let rest = &self.source[start..];
        match rest.find('.') {
            Some(end) => &rest[..end],
            None => rest,
        }
    }
}

/// Decode an ingestion body into events and shift their timestamps.
///
/// A body starting with `[` is a batch; anything else is a single event.
/// Any decoding failure rejects the whole body.
pub fn normalize_payload(body: &[u8], offset_hours: i8) -> Result<Vec<LogEvent>, PayloadError> {
    let first = body.iter().find(|b| !b.is_ascii_whitespace());

    let mut events: Vec<LogEvent> = if first == Some(&b'[') {
        serde_json::from_slice(body)?
    } else {
        vec![serde_json::from_slice(body)?]
    };

    let shift = Duration::hours(i64::from(offset_hours));
    for event in &mut events {
        event.timestamp += shift;
    }

    Ok(events)
}
