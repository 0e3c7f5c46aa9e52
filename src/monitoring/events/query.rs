//! Filters over retained events

use super::types::{Event, EventLevel};
use chrono::{DateTime, Utc};

/// Filter applied by [`StructuredEventLog::query`](super::StructuredEventLog::query)
///
/// Every populated field must match. Tags match when the event carries all of them.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub min_level: Option<EventLevel>,
    pub levels: Vec<EventLevel>,
    pub service: Option<String>,
    pub operation: Option<String>,
    pub tags: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_correlation(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }

    pub fn min_level(mut self, level: EventLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn level(mut self, level: EventLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes this filter
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(min) = self.min_level {
            if event.level < min {
                return false;
            }
        }
        if !self.levels.is_empty() && !self.levels.contains(&event.level) {
            return false;
        }
        if let Some(service) = &self.service {
            if &event.service != service {
                return false;
            }
        }
        if let Some(operation) = &self.operation {
            if event.operation.as_ref() != Some(operation) {
                return false;
            }
        }
        if !self.tags.iter().all(|t| event.tags.contains(t)) {
            return false;
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if event.correlation_id.as_ref() != Some(correlation_id) {
                return false;
            }
        }
        true
    }
}
