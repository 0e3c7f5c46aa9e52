//! Correlation id issuance and idle garbage collection

use crate::config::CorrelationConfig;
use crate::utils::time::{Clock, has_elapsed};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Originating context of a correlation id
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationContext {
    /// Opaque correlation token
    pub id: String,
    /// When the correlation was opened
    pub created_at: DateTime<Utc>,
    /// Free-form context supplied by the producer
    pub origin: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug)]
struct TrackedCorrelation {
    context: CorrelationContext,
    last_seen: DateTime<Utc>,
}

/// Issues and tracks correlation ids
#[derive(Debug)]
pub struct CorrelationTracker {
    contexts: DashMap<String, TrackedCorrelation>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CorrelationTracker {
    pub fn new(config: &CorrelationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            contexts: DashMap::new(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            clock,
        }
    }

    /// Open a new correlation and return its id
    pub fn new_correlation(&self, origin: BTreeMap<String, serde_json::Value>) -> String {
        let now = self.clock.now();
        let id = Uuid::new_v4().simple().to_string();
        self.contexts.insert(
            id.clone(),
            TrackedCorrelation {
                context: CorrelationContext {
                    id: id.clone(),
                    created_at: now,
                    origin,
                },
                last_seen: now,
            },
        );
        debug!(correlation_id = %id, "Opened correlation");
        id
    }

    /// Look up the originating context of a correlation id
    pub fn get(&self, id: &str) -> Option<CorrelationContext> {
        self.contexts.get(id).map(|t| t.context.clone())
    }

    /// Record activity on a correlation id; returns false if it is unknown
    pub fn touch(&self, id: &str) -> bool {
        match self.contexts.get_mut(id) {
            Some(mut tracked) => {
                tracked.last_seen = self.clock.now();
                true
            }
            None => false,
        }
    }

    /// Last time an event referenced `id`
    pub fn last_seen(&self, id: &str) -> Option<DateTime<Utc>> {
        self.contexts.get(id).map(|t| t.last_seen)
    }

    /// Remove correlations idle longer than the configured window
    ///
    /// Correlations for which `has_open_spans` returns true are kept regardless of age.
    pub fn sweep(&self, has_open_spans: impl Fn(&str) -> bool) -> usize {
        let now = self.clock.now();
        let before = self.contexts.len();
        self.contexts.retain(|id, tracked| {
            !has_elapsed(tracked.last_seen, now, self.idle_timeout) || has_open_spans(id)
        });
        let removed = before.saturating_sub(self.contexts.len());
        if removed > 0 {
            debug!(removed, "Swept idle correlations");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn clear(&self) {
        self.contexts.clear();
    }
}
