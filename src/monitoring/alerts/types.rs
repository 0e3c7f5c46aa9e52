//! Alert types and data structures

use crate::monitoring::types::AlertSeverity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Comparison operators for alert rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "gt")]
    GreaterThan,
    #[serde(rename = "lt")]
    LessThan,
    #[serde(rename = "gte")]
    GreaterThanOrEqual,
    #[serde(rename = "lte")]
    LessThanOrEqual,
    #[serde(rename = "eq")]
    Equal,
    #[serde(rename = "ne")]
    NotEqual,
}

impl ComparisonOperator {
    /// Whether `value` satisfies the operator against `threshold`
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::GreaterThanOrEqual => value >= threshold,
            ComparisonOperator::LessThanOrEqual => value <= threshold,
            ComparisonOperator::Equal => (value - threshold).abs() < f64::EPSILON,
            ComparisonOperator::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
        }
    }
}

/// What a rule watches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    /// Metric series name
    pub metric: String,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    /// Samples younger than this are averaged during periodic evaluation
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: u64,
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
}

fn default_time_window_secs() -> u64 {
    300
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

/// Severity and channel upgrade for alerts that stay firing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Delay after creation before escalating
    pub delay_secs: u64,
    #[serde(default)]
    pub channels: Vec<String>,
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressionPolicy {
    /// Used when a suppression request does not name a duration
    pub default_duration_secs: u64,
}

/// Alert rule for automated alerting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Rule ID
    pub id: String,
    /// Rule name
    pub name: String,
    /// Rule description
    #[serde(default)]
    pub description: String,
    pub condition: AlertCondition,
    /// Alert severity
    #[serde(default)]
    pub severity: AlertSeverity,
    /// Notification channels for this rule
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub escalation: Option<EscalationPolicy>,
    #[serde(default)]
    pub suppression: Option<SuppressionPolicy>,
    /// Whether the rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl AlertRule {
    /// A minimal enabled rule without escalation or suppression
    pub fn new(
        id: impl Into<String>,
        metric: impl Into<String>,
        operator: ComparisonOperator,
        threshold: f64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            condition: AlertCondition {
                metric: metric.into(),
                operator,
                threshold,
                time_window_secs: default_time_window_secs(),
                evaluation_interval_secs: default_evaluation_interval_secs(),
            },
            severity: AlertSeverity::Warning,
            channels: Vec::new(),
            tags: BTreeSet::new(),
            escalation: None,
            suppression: None,
            enabled: true,
        }
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = Some(escalation);
        self
    }

    pub fn with_suppression(mut self, default_duration_secs: u64) -> Self {
        self.suppression = Some(SuppressionPolicy {
            default_duration_secs,
        });
        self
    }

    /// Reject rules that can never be evaluated meaningfully
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Alert rule id cannot be empty".to_string());
        }
        if self.condition.metric.trim().is_empty() {
            return Err(format!("Alert rule {} has an empty metric", self.id));
        }
        if !self.condition.threshold.is_finite() {
            return Err(format!(
                "Alert rule {} threshold must be finite, got {}",
                self.id, self.condition.threshold
            ));
        }
        if self.condition.time_window_secs == 0 {
            return Err(format!("Alert rule {} time window must be positive", self.id));
        }
        if self.condition.evaluation_interval_secs == 0 {
            return Err(format!(
                "Alert rule {} evaluation interval must be positive",
                self.id
            ));
        }
        if let Some(escalation) = &self.escalation {
            if escalation.severity < self.severity {
                return Err(format!(
                    "Alert rule {} escalation severity {} is below rule severity {}",
                    self.id, escalation.severity, self.severity
                ));
            }
        }
        if let Some(suppression) = &self.suppression {
            if suppression.default_duration_secs == 0 {
                return Err(format!(
                    "Alert rule {} default suppression must be positive",
                    self.id
                ));
            }
        }
        Ok(())
    }
}

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Rule registered but not yet evaluated
    Pending,
    Firing,
    Acknowledged,
    Resolved,
    Suppressed,
}

impl AlertStatus {
    pub fn is_open(self) -> bool {
        self != AlertStatus::Resolved
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Firing => "firing",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Suppressed => "suppressed",
        };
        f.write_str(s)
    }
}

/// An alert raised by a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub metric: String,
    pub status: AlertStatus,
    pub severity: AlertSeverity,
    /// Value from the latest triggering evaluation
    pub value: f64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub suppression_expiry: Option<DateTime<Utc>>,
    pub suppression_reason: Option<String>,
    pub escalation_level: u32,
}

impl Alert {
    /// One-line summary used by text channels
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} ({}): {} = {} (threshold {})",
            self.severity, self.rule_name, self.status, self.metric, self.value, self.threshold
        )
    }
}

/// Result of evaluating a rule against a value
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Created(Alert),
    Updated(Alert),
    Resolved(Alert),
    NoChange,
}

impl EvaluationOutcome {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            EvaluationOutcome::Created(a)
            | EvaluationOutcome::Updated(a)
            | EvaluationOutcome::Resolved(a) => Some(a),
            EvaluationOutcome::NoChange => None,
        }
    }
}

/// Why a notification was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Fired,
    Escalated,
    Resolved,
}

/// Outcome of one channel send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationResult {
    pub channel: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

/// Per-channel dispatch checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Alerts below this severity are skipped
    #[serde(default)]
    pub min_severity: AlertSeverity,
    /// When non-empty, the alert must carry at least one of these tags
    #[serde(default)]
    pub required_tags: BTreeSet<String>,
    /// Sends allowed per minute; unlimited when absent
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_severity: AlertSeverity::Info,
            required_tags: BTreeSet::new(),
            rate_limit_per_minute: None,
        }
    }
}

impl ChannelSettings {
    /// Severity and tag filter
    pub fn matches(&self, alert: &Alert) -> bool {
        alert.severity >= self.min_severity
            && (self.required_tags.is_empty()
                || self.required_tags.iter().any(|t| alert.tags.contains(t)))
    }
}

/// Alert statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct AlertStats {
    /// Alerts created
    pub total_alerts: u64,
    /// Alerts by severity
    pub alerts_by_severity: HashMap<String, u64>,
    /// Alerts by rule
    pub alerts_by_rule: HashMap<String, u64>,
    pub escalations: u64,
    pub resolved: u64,
    /// Notifications sent successfully
    pub notifications_sent: u64,
    /// Failed notifications
    pub failed_notifications: u64,
    /// Last alert timestamp
    pub last_alert: Option<DateTime<Utc>>,
}
