//! Trace analysis configuration

use serde::{Deserialize, Serialize};

/// Thresholds used when a pipeline trace is closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Spans slower than this are flagged high
    pub duration_warning_ms: u64,
    /// Spans slower than this are flagged critical
    pub duration_error_ms: u64,
    pub memory_threshold_mb: f64,
    pub cpu_threshold_percent: f64,
    /// Closed pipelines kept for inspection
    pub history_size: usize,
    /// Advisory savings credited per parallelizable span
    pub parallel_savings_percent: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            duration_warning_ms: 5000,
            duration_error_ms: 30_000,
            memory_threshold_mb: 512.0,
            cpu_threshold_percent: 80.0,
            history_size: 100,
            parallel_savings_percent: 15.0,
        }
    }
}
