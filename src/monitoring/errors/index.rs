//! Fingerprint-keyed error record index

use super::classifier::classify;
use super::fingerprint::{fingerprint, stack_digest};
use super::types::{
    ErrorAnalytics, ErrorContext, ErrorFilter, ErrorPattern, ErrorRecord, ErrorStatus,
    RepresentativeError, Resolution, ResolveOutcome, TrackedError,
};
use crate::config::ErrorTrackingConfig;
use crate::monitoring::bounded::BoundedPush;
use crate::monitoring::events::{EventError, StructuredEventLog};
use crate::utils::error::{ObservabilityError, Result};
use crate::utils::generate_id;
use crate::utils::time::Clock;
use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

const TOP_PATTERNS: usize = 10;

#[derive(Debug, Default)]
struct IndexState {
    records: HashMap<String, ErrorRecord>,
    /// Fingerprint of every retained record that new occurrences can join
    by_fingerprint: HashMap<String, String>,
}

/// Deduplicates error occurrences into records by fingerprint
#[derive(Debug)]
pub struct ErrorFingerprintIndex {
    config: ErrorTrackingConfig,
    clock: Arc<dyn Clock>,
    events: Arc<StructuredEventLog>,
    state: RwLock<IndexState>,
}

impl ErrorFingerprintIndex {
    pub fn new(
        config: ErrorTrackingConfig,
        clock: Arc<dyn Clock>,
        events: Arc<StructuredEventLog>,
    ) -> Self {
        Self {
            config,
            clock,
            events,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Record one occurrence of `error`
    ///
    /// Joins the open record with the same fingerprint, or opens a new one when
    /// there is none or the previous record was resolved.
    pub fn track(
        &self,
        error: &EventError,
        context: ErrorContext,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<TrackedError> {
        if error.name.trim().is_empty() {
            return Err(ObservabilityError::validation("error name cannot be empty"));
        }

        let digest = stack_digest(error.stack.as_deref(), self.config.stack_frames);
        let fp = fingerprint(&error.name, &error.message, &digest);
        let now = self.clock.now();

        let mut state = self.state.write();
        let existing = state
            .by_fingerprint
            .get(&fp)
            .cloned()
            .filter(|id| {
                state
                    .records
                    .get(id)
                    .is_some_and(|r| r.status != ErrorStatus::Resolved)
            });

        if let Some(id) = existing {
            if let Some(record) = state.records.get_mut(&id) {
                record.occurrence_count += 1;
                record.last_occurrence = now;
                record
                    .recent_occurrences
                    .push_bounded(now, self.config.max_recent_occurrences);
                absorb_context(record, &context);

                debug!(
                    error_id = %id,
                    occurrences = record.occurrence_count,
                    "Error occurrence joined existing record"
                );
                return Ok(TrackedError {
                    id,
                    fingerprint: fp,
                    occurrence_count: record.occurrence_count,
                    is_new: false,
                });
            }
        }

        let (severity, category) = classify(&error.name, &error.message);
        let id = generate_id();
        let mut record = ErrorRecord {
            id: id.clone(),
            fingerprint: fp.clone(),
            representative: RepresentativeError {
                name: error.name.clone(),
                message: error.message.clone(),
                stack_digest: digest,
            },
            severity,
            category,
            first_occurrence: now,
            last_occurrence: now,
            occurrence_count: 1,
            affected_correlation_ids: BTreeSet::new(),
            affected_users: BTreeSet::new(),
            affected_services: BTreeSet::new(),
            status: ErrorStatus::Open,
            resolution: None,
            on_hold: false,
            recent_occurrences: VecDeque::new(),
            metadata,
        };
        record
            .recent_occurrences
            .push_bounded(now, self.config.max_recent_occurrences);
        absorb_context(&mut record, &context);

        state.records.insert(id.clone(), record);
        state.by_fingerprint.insert(fp.clone(), id.clone());

        info!(
            error_id = %id,
            name = %error.name,
            severity = severity.as_str(),
            category = category.as_str(),
            "New error record"
        );
        Ok(TrackedError {
            id,
            fingerprint: fp,
            occurrence_count: 1,
            is_new: true,
        })
    }

    pub fn get(&self, id: &str) -> Option<ErrorRecord> {
        self.state.read().records.get(id).cloned()
    }

    /// The record new occurrences of `fingerprint` would join
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<ErrorRecord> {
        let state = self.state.read();
        state
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| state.records.get(id))
            .cloned()
    }

    /// Mark a record resolved
    ///
    /// Resolving twice is a no-op that reports `AlreadyResolved`.
    pub fn resolve(&self, id: &str, note: &str, resolver: &str) -> Result<ResolveOutcome> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| ObservabilityError::not_found(format!("error record {}", id)))?;

        if record.status == ErrorStatus::Resolved {
            drop(state);
            self.events.warn(
                "error_index",
                "resolve",
                format!("error record {} is already resolved", id),
                None,
            );
            return Ok(ResolveOutcome::AlreadyResolved);
        }

        record.status = ErrorStatus::Resolved;
        record.resolution = Some(Resolution {
            note: note.to_string(),
            resolver: resolver.to_string(),
            resolved_at: now,
        });
        info!(error_id = %id, resolver = %resolver, "Error record resolved");
        Ok(ResolveOutcome::Resolved)
    }

    /// Move an unresolved record between `open`, `investigating` and `ignored`
    pub fn set_status(&self, id: &str, status: ErrorStatus) -> Result<()> {
        if status == ErrorStatus::Resolved {
            return Err(ObservabilityError::validation(
                "use resolve() to resolve an error record",
            ));
        }
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| ObservabilityError::not_found(format!("error record {}", id)))?;
        if record.status == ErrorStatus::Resolved {
            return Err(ObservabilityError::validation(format!(
                "error record {} is resolved; a recurrence opens a new record",
                id
            )));
        }
        record.status = status;
        Ok(())
    }

    /// Exempt a record from retention eviction, or lift the exemption
    pub fn set_hold(&self, id: &str, on_hold: bool) -> Result<()> {
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| ObservabilityError::not_found(format!("error record {}", id)))?;
        record.on_hold = on_hold;
        Ok(())
    }

    /// Matching records, most recently seen first
    pub fn search(&self, filter: &ErrorFilter) -> Vec<ErrorRecord> {
        let mut found: Vec<ErrorRecord> = self
            .state
            .read()
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.last_occurrence.cmp(&a.last_occurrence));
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        found
    }

    pub fn analytics(&self) -> ErrorAnalytics {
        let hour_ago = self.clock.now() - ChronoDuration::hours(1);
        let state = self.state.read();
        let mut analytics = ErrorAnalytics {
            total_records: state.records.len(),
            ..ErrorAnalytics::default()
        };

        for record in state.records.values() {
            let count = record.occurrence_count;
            analytics.total_occurrences += count;
            if matches!(record.status, ErrorStatus::Open | ErrorStatus::Investigating) {
                analytics.open_records += 1;
            }
            if count > 1 {
                analytics.recurring += 1;
            }
            *analytics
                .by_severity
                .entry(record.severity.as_str().to_string())
                .or_insert(0) += count;
            *analytics
                .by_category
                .entry(record.category.as_str().to_string())
                .or_insert(0) += count;
            for service in &record.affected_services {
                *analytics.by_service.entry(service.clone()).or_insert(0) += count;
            }
            analytics.occurrences_last_hour += record
                .recent_occurrences
                .iter()
                .filter(|t| **t >= hour_ago)
                .count() as u64;
        }

        let mut patterns: Vec<&ErrorRecord> = state.records.values().collect();
        patterns.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| b.last_occurrence.cmp(&a.last_occurrence))
        });
        analytics.top_patterns = patterns
            .into_iter()
            .take(TOP_PATTERNS)
            .map(|r| ErrorPattern {
                id: r.id.clone(),
                fingerprint: r.fingerprint.clone(),
                name: r.representative.name.clone(),
                message: r.representative.message.clone(),
                occurrence_count: r.occurrence_count,
                severity: r.severity,
            })
            .collect();

        analytics
    }

    /// Drop records not seen within the retention window
    ///
    /// Held records are kept. The fingerprint mapping goes with the record, so a
    /// later occurrence of the same error opens a new record.
    pub fn evict_expired(&self) -> usize {
        let retention =
            ChronoDuration::from_std(std::time::Duration::from_secs(self.config.retention_secs));
        let Some(cutoff) = retention
            .ok()
            .and_then(|r| self.clock.now().checked_sub_signed(r))
        else {
            // retention reaches back past any representable timestamp
            return 0;
        };

        let mut state = self.state.write();
        let expired: Vec<(String, String)> = state
            .records
            .values()
            .filter(|r| !r.on_hold && r.last_occurrence < cutoff)
            .map(|r| (r.id.clone(), r.fingerprint.clone()))
            .collect();

        for (id, fp) in &expired {
            state.records.remove(id);
            if state.by_fingerprint.get(fp) == Some(id) {
                state.by_fingerprint.remove(fp);
            }
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), "Evicted expired error records");
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.records.clear();
        state.by_fingerprint.clear();
    }
}

fn absorb_context(record: &mut ErrorRecord, context: &ErrorContext) {
    if let Some(correlation_id) = &context.correlation_id {
        record
            .affected_correlation_ids
            .insert(correlation_id.clone());
    }
    if let Some(user_id) = &context.user_id {
        record.affected_users.insert(user_id.clone());
    }
    if let Some(service) = &context.service {
        record.affected_services.insert(service.clone());
    }
}
