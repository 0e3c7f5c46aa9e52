//! Metrics and bottleneck configuration

use serde::{Deserialize, Serialize};

/// Metrics store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Ring buffer size per metric name
    pub max_samples: usize,
    /// Resource sampling and bottleneck detection interval
    pub collection_interval_secs: u64,
    pub trend_min_samples: usize,
    pub trend_window: usize,
    /// Changes smaller than this percentage are stable
    pub stable_threshold_percent: f64,
    /// Residual spread relative to the mean above which a series is volatile
    pub volatility_threshold: f64,
    /// Fraction of the warning threshold at which a low bottleneck is reported
    pub approach_ratio: f64,
    pub thresholds: BottleneckThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            collection_interval_secs: 10,
            trend_min_samples: 10,
            trend_window: 20,
            stable_threshold_percent: 5.0,
            volatility_threshold: 0.5,
            approach_ratio: 0.8,
            thresholds: BottleneckThresholds::default(),
        }
    }
}

/// Warning and critical levels for one metric class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdPair {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

/// Two-tier thresholds per metric class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BottleneckThresholds {
    pub cpu_percent: ThresholdPair,
    pub memory_percent: ThresholdPair,
    pub response_time_ms: ThresholdPair,
    pub error_rate_percent: ThresholdPair,
}

impl Default for BottleneckThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: ThresholdPair::new(70.0, 90.0),
            memory_percent: ThresholdPair::new(80.0, 95.0),
            response_time_ms: ThresholdPair::new(1000.0, 5000.0),
            error_rate_percent: ThresholdPair::new(5.0, 10.0),
        }
    }
}
