//! Types for metrics storage and analysis

use super::sampler::ResourceSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Timer,
    Rate,
}

impl MetricKind {
    /// Whether negative samples are meaningless for this kind
    pub fn is_non_negative(self) -> bool {
        matches!(self, MetricKind::Counter | MetricKind::Timer | MetricKind::Rate)
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Timer => "timer",
            MetricKind::Rate => "rate",
        };
        f.write_str(s)
    }
}

/// One metric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Distribution summary of a series' retained samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub latest: f64,
}

/// Direction of a metric over its recent window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
    Volatile,
}

/// Half-window comparison of a metric's recent samples
///
/// A cheap heuristic: `prediction` is a one-step least-squares extrapolation
/// and `confidence` is only the magnitude of change capped at 1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    pub metric: String,
    pub direction: TrendDirection,
    /// Percent change from the older half's average to the newer half's
    pub change_percent: f64,
    pub confidence: f64,
    /// Extrapolated next sample
    pub prediction: f64,
    /// Samples considered
    pub samples: usize,
}

/// Latest resource sample merged with the latest value of every custom metric
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub resources: Option<ResourceSample>,
    pub metrics: BTreeMap<String, f64>,
}

/// Advisory utilization outlook for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacitySignal {
    pub resource: String,
    pub utilization_percent: f64,
    pub headroom_percent: f64,
    /// Fitted change per collection interval
    pub slope_per_sample: f64,
    /// Collection intervals until 100% at the fitted slope, if rising
    pub projected_samples_to_exhaustion: Option<u64>,
}
