//! Error record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Timeout,
    Network,
    Authentication,
    RateLimit,
    Resource,
    Database,
    Serialization,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    Open,
    Investigating,
    Resolved,
    Ignored,
}

impl ErrorSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Database => "database",
            ErrorCategory::Serialization => "serialization",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorStatus::Open => "open",
            ErrorStatus::Investigating => "investigating",
            ErrorStatus::Resolved => "resolved",
            ErrorStatus::Ignored => "ignored",
        };
        f.write_str(s)
    }
}

/// Where an error occurrence was observed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub correlation_id: Option<String>,
    pub user_id: Option<String>,
    pub service: Option<String>,
    pub operation: Option<String>,
}

impl ErrorContext {
    pub fn for_correlation(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// The first occurrence of a fingerprint, kept as its representative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeError {
    pub name: String,
    pub message: String,
    /// The stack lines that went into the fingerprint
    pub stack_digest: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub note: String,
    pub resolver: String,
    pub resolved_at: DateTime<Utc>,
}

/// All occurrences of one error fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub fingerprint: String,
    pub representative: RepresentativeError,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub occurrence_count: u64,
    pub affected_correlation_ids: BTreeSet<String>,
    pub affected_users: BTreeSet<String>,
    pub affected_services: BTreeSet<String>,
    pub status: ErrorStatus,
    pub resolution: Option<Resolution>,
    /// Held records are never evicted
    pub on_hold: bool,
    /// Most recent occurrence timestamps, oldest first
    pub recent_occurrences: VecDeque<DateTime<Utc>>,
    /// Metadata supplied with the first occurrence
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Result of a `track` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedError {
    pub id: String,
    pub fingerprint: String,
    pub occurrence_count: u64,
    /// Whether this occurrence opened a new record
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved,
    AlreadyResolved,
}

/// Search filter; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct ErrorFilter {
    pub severity: Option<ErrorSeverity>,
    pub category: Option<ErrorCategory>,
    pub status: Option<ErrorStatus>,
    pub service: Option<String>,
    pub correlation_id: Option<String>,
    /// Case-insensitive substring of name or message
    pub text: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ErrorFilter {
    pub fn matches(&self, record: &ErrorRecord) -> bool {
        if self.severity.is_some_and(|s| s != record.severity) {
            return false;
        }
        if self.category.is_some_and(|c| c != record.category) {
            return false;
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if let Some(service) = &self.service {
            if !record.affected_services.contains(service) {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if !record.affected_correlation_ids.contains(correlation_id) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.last_occurrence < since {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let text = text.to_lowercase();
            let rep = &record.representative;
            if !rep.name.to_lowercase().contains(&text)
                && !rep.message.to_lowercase().contains(&text)
            {
                return false;
            }
        }
        true
    }
}

/// A frequently recurring fingerprint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPattern {
    pub id: String,
    pub fingerprint: String,
    pub name: String,
    pub message: String,
    pub occurrence_count: u64,
    pub severity: ErrorSeverity,
}

/// Aggregate view over retained records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorAnalytics {
    pub total_records: usize,
    pub open_records: usize,
    pub total_occurrences: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub by_service: BTreeMap<String, u64>,
    /// Most frequent records first
    pub top_patterns: Vec<ErrorPattern>,
    /// Records seen more than once
    pub recurring: usize,
    pub occurrences_last_hour: u64,
}
