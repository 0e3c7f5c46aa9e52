//! Event types for the structured event log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Event severity level
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
            EventLevel::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(EventLevel::Debug),
            "info" => Ok(EventLevel::Info),
            "warn" | "warning" => Ok(EventLevel::Warn),
            "error" => Ok(EventLevel::Error),
            "fatal" | "critical" => Ok(EventLevel::Fatal),
            other => Err(format!("unknown event level '{}'", other)),
        }
    }
}

/// Error details attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// A structured runtime event
///
/// Immutable once handed to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID, assigned by the log when empty
    #[serde(default)]
    pub id: String,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Severity level
    pub level: EventLevel,
    /// Human-readable message
    pub message: String,
    /// Correlation id linking this event to a request chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Emitting service
    pub service: String,
    /// Operation within the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Structured fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Error details for error events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(level: EventLevel, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            correlation_id: None,
            service: service.into(),
            operation: None,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            error: None,
        }
    }

    pub fn debug(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Debug, service, message)
    }

    pub fn info(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, service, message)
    }

    pub fn warn(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, service, message)
    }

    pub fn error(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, service, message)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_error(
        mut self,
        name: impl Into<String>,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        self.error = Some(EventError {
            name: name.into(),
            message: message.into(),
            stack,
        });
        self
    }

    /// Whether this event marks a span boundary for the trace builder
    pub fn is_span_boundary(&self) -> bool {
        self.tags.contains(SPAN_START_TAG) || self.tags.contains(SPAN_END_TAG)
    }
}

/// Tag carried by events emitted when a span opens
pub const SPAN_START_TAG: &str = "span.start";
/// Tag carried by events emitted when a span closes
pub const SPAN_END_TAG: &str = "span.end";
/// Tag carried by events whose encoding failed during flush
pub const MALFORMED_TAG: &str = "malformed";

/// Record of an event that could not be encoded for durable storage
#[derive(Debug, Clone, Serialize)]
pub struct MalformedEvent {
    /// The offending event, tagged as malformed
    pub event: Event,
    /// Why encoding failed
    pub reason: String,
    /// When the failure was detected
    pub detected_at: DateTime<Utc>,
}

/// Outcome of a flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Events written to the sink
    pub flushed: usize,
    /// Events that failed to encode and were set aside
    pub malformed: usize,
}

/// Counters describing the log's lifetime activity
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventLogStats {
    pub emitted: u64,
    pub dropped_below_level: u64,
    pub flushed: u64,
    pub malformed: u64,
    pub failed_flushes: u64,
    pub buffered: usize,
    pub retained: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(EventLevel::Debug < EventLevel::Info);
        assert!(EventLevel::Warn < EventLevel::Error);
        assert!(EventLevel::Error < EventLevel::Fatal);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("WARNING".parse::<EventLevel>(), Ok(EventLevel::Warn));
        assert_eq!("fatal".parse::<EventLevel>(), Ok(EventLevel::Fatal));
        assert!("loud".parse::<EventLevel>().is_err());
    }

    #[test]
    fn test_event_builder() {
        let event = Event::error("gateway", "upstream failed")
            .with_correlation("corr-1")
            .with_operation("chat")
            .with_tag("provider")
            .with_metadata("status", serde_json::json!(502))
            .with_error("HttpError", "bad gateway", None);

        assert!(event.id.is_empty());
        assert_eq!(event.level, EventLevel::Error);
        assert_eq!(event.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(event.operation.as_deref(), Some("chat"));
        assert!(event.tags.contains("provider"));
        assert_eq!(event.metadata["status"], serde_json::json!(502));
        assert_eq!(event.error.as_ref().unwrap().name, "HttpError");
        assert!(!event.is_span_boundary());
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = Event::info("svc", "hello");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"level\":\"info\""));
        assert!(!json.contains("correlation_id"));
        assert!(!json.contains("tags"));
        assert!(!json.contains("error"));
    }
}
