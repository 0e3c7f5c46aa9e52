//! Type definitions shared across the monitoring components

use serde::{Deserialize, Serialize};

/// Alert severity levels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[default]
    Info,
    Warning,
    Critical,
    Emergency,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "INFO"),
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
            AlertSeverity::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

/// Severity of a detected bottleneck
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BottleneckSeverity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for BottleneckSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BottleneckSeverity::Low => "low",
            BottleneckSeverity::Medium => "medium",
            BottleneckSeverity::High => "high",
            BottleneckSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A metric sample or span measurement that crossed a configured threshold
///
/// Derived on every detection cycle, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    /// Metric (or span) the finding is about
    pub metric: String,
    /// Severity tier that was crossed
    pub severity: BottleneckSeverity,
    /// Observed value
    pub current_value: f64,
    /// Threshold that was crossed
    pub threshold: f64,
    /// Suggested remediation
    pub recommendation: String,
}
