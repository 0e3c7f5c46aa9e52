//! Metrics storage and analysis
//!
//! Bounded per-name time series, threshold bottleneck detection, half-window
//! trend analysis and resource sampling through [`ResourceSampler`].

mod bottleneck;
mod helpers;
mod sampler;
mod store;
#[cfg(feature = "metrics")]
mod system;
mod trend;
mod types;


pub use bottleneck::{MetricClass, evaluate_thresholds};
pub(crate) use helpers::calculate_average;
pub use sampler::{ResourceSample, ResourceSampler, StaticSampler};
pub use store::{CPU_METRIC, DISK_METRIC, MEMORY_METRIC, MetricsStore, NETWORK_METRIC};
#[cfg(feature = "metrics")]
pub use system::SysinfoSampler;
pub use types::{
    CapacitySignal, Metric, MetricKind, MetricSummary, PerformanceSnapshot, TrendAnalysis,
    TrendDirection,
};
