//! Threshold-based bottleneck detection

use crate::config::{BottleneckThresholds, ThresholdPair};
use crate::monitoring::types::{Bottleneck, BottleneckSeverity};
use serde::Serialize;

/// Metric families that have bottleneck thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricClass {
    Cpu,
    Memory,
    ResponseTime,
    ErrorRate,
}

impl MetricClass {
    /// Infer the class from a metric name
    pub fn classify(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.contains("error_rate") {
            Some(MetricClass::ErrorRate)
        } else if name.contains("response_time")
            || name.contains("latency")
            || name.contains("duration")
        {
            Some(MetricClass::ResponseTime)
        } else if name.contains("cpu") {
            Some(MetricClass::Cpu)
        } else if name.contains("memory") {
            Some(MetricClass::Memory)
        } else {
            None
        }
    }

    fn recommendation(self) -> &'static str {
        match self {
            MetricClass::Cpu => "Scale out workers or reduce concurrent pipeline stages",
            MetricClass::Memory => "Shrink in-memory buffers or raise the memory limit",
            MetricClass::ResponseTime => {
                "Investigate slow dependencies; add caching or tighten timeouts"
            }
            MetricClass::ErrorRate => "Inspect recent error fingerprints for a dominant failure",
        }
    }
}

impl BottleneckThresholds {
    pub fn for_class(&self, class: MetricClass) -> ThresholdPair {
        match class {
            MetricClass::Cpu => self.cpu_percent,
            MetricClass::Memory => self.memory_percent,
            MetricClass::ResponseTime => self.response_time_ms,
            MetricClass::ErrorRate => self.error_rate_percent,
        }
    }
}

/// Compare `value` against the two-tier thresholds of `class`
///
/// Critical at or above the critical threshold, high at or above the warning
/// threshold, and low once the value reaches `approach_ratio` of the warning
/// threshold.
pub fn evaluate_thresholds(
    metric: &str,
    value: f64,
    class: MetricClass,
    thresholds: &BottleneckThresholds,
    approach_ratio: f64,
) -> Option<Bottleneck> {
    let pair = thresholds.for_class(class);
    let (severity, threshold) = if value >= pair.critical {
        (BottleneckSeverity::Critical, pair.critical)
    } else if value >= pair.warning {
        (BottleneckSeverity::High, pair.warning)
    } else if approach_ratio > 0.0 && value >= pair.warning * approach_ratio {
        (BottleneckSeverity::Low, pair.warning)
    } else {
        return None;
    };

    let recommendation = if severity == BottleneckSeverity::Low {
        format!("Approaching threshold: {}", class.recommendation())
    } else {
        class.recommendation().to_string()
    };

    Some(Bottleneck {
        metric: metric.to_string(),
        severity,
        current_value: value,
        threshold,
        recommendation,
    })
}
