//! Metrics store implementation

use super::bottleneck::{MetricClass, evaluate_thresholds};
use super::helpers::{calculate_average, calculate_percentile, linear_regression};
use super::sampler::{ResourceSample, ResourceSampler};
use super::trend::{TrendSettings, analyze};
use super::types::{
    CapacitySignal, Metric, MetricKind, MetricSummary, PerformanceSnapshot, TrendAnalysis,
};
use crate::config::MetricsConfig;
use crate::monitoring::bounded::BoundedPush;
use crate::monitoring::types::Bottleneck;
use crate::utils::error::{ObservabilityError, Result};
use crate::utils::time::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const CPU_METRIC: &str = "system.cpu_percent";
pub const MEMORY_METRIC: &str = "system.memory_percent";
pub const DISK_METRIC: &str = "system.disk_percent";
pub const NETWORK_METRIC: &str = "system.network_bytes";

#[derive(Debug)]
struct MetricSeries {
    kind: MetricKind,
    samples: VecDeque<Metric>,
}

/// Time-series store with one bounded ring buffer per metric name
#[derive(Debug)]
pub struct MetricsStore {
    config: MetricsConfig,
    clock: Arc<dyn Clock>,
    sampler: Arc<dyn ResourceSampler>,
    series: RwLock<HashMap<String, MetricSeries>>,
    resources: RwLock<Option<ResourceSample>>,
}

impl MetricsStore {
    pub fn new(
        config: MetricsConfig,
        clock: Arc<dyn Clock>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        Self {
            config,
            clock,
            sampler,
            series: RwLock::new(HashMap::new()),
            resources: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Append a sample to the named series
    ///
    /// The oldest sample is evicted once the series holds `max_samples`.
    pub fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        unit: &str,
        tags: BTreeMap<String, String>,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(ObservabilityError::validation("metric name cannot be empty"));
        }
        if !value.is_finite() {
            return Err(ObservabilityError::validation(format!(
                "metric {} value must be finite, got {}",
                name, value
            )));
        }
        if kind.is_non_negative() && value < 0.0 {
            return Err(ObservabilityError::validation(format!(
                "{} metric {} cannot be negative",
                kind, name
            )));
        }

        let metric = Metric {
            name: name.to_string(),
            kind,
            value,
            unit: unit.to_string(),
            timestamp: self.clock.now(),
            tags,
        };

        let mut series = self.series.write();
        let entry = series.entry(name.to_string()).or_insert_with(|| MetricSeries {
            kind,
            samples: VecDeque::new(),
        });
        if entry.kind != kind {
            return Err(ObservabilityError::validation(format!(
                "metric {} is a {}, cannot record a {} sample",
                name, entry.kind, kind
            )));
        }
        entry.samples.push_bounded(metric, self.config.max_samples);
        Ok(())
    }

    /// Record a gauge without tags
    pub fn gauge(&self, name: &str, value: f64, unit: &str) -> Result<()> {
        self.record(name, MetricKind::Gauge, value, unit, BTreeMap::new())
    }

    /// Latest sample of a series
    pub fn latest(&self, name: &str) -> Option<Metric> {
        self.series
            .read()
            .get(name)
            .and_then(|s| s.samples.back().cloned())
    }

    pub fn latest_value(&self, name: &str) -> Option<f64> {
        self.series
            .read()
            .get(name)
            .and_then(|s| s.samples.back().map(|m| m.value))
    }

    /// Most recent `limit` samples of a series, oldest first
    pub fn series(&self, name: &str, limit: Option<usize>) -> Vec<Metric> {
        let series = self.series.read();
        let Some(s) = series.get(name) else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |l| s.samples.len().saturating_sub(l));
        s.samples.iter().skip(skip).cloned().collect()
    }

    /// Values recorded within `window` of now, in arrival order
    pub fn window_values(&self, name: &str, window: Duration) -> Vec<f64> {
        // a window reaching past the earliest representable instant covers everything
        let cutoff = ChronoDuration::from_std(window)
            .ok()
            .and_then(|w| self.clock.now().checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.series
            .read()
            .get(name)
            .map(|s| {
                s.samples
                    .iter()
                    .filter(|m| m.timestamp >= cutoff)
                    .map(|m| m.value)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn values(&self, name: &str) -> Option<Vec<f64>> {
        self.series
            .read()
            .get(name)
            .map(|s| s.samples.iter().map(|m| m.value).collect())
    }

    /// Names of all series
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Distribution of a series' retained samples
    pub fn summary(&self, name: &str) -> Option<MetricSummary> {
        let values = self.values(name)?;
        let latest = *values.last()?;
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(MetricSummary {
            name: name.to_string(),
            count: values.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            avg: calculate_average(&values),
            p50: calculate_percentile(&sorted, 0.5),
            p95: calculate_percentile(&sorted, 0.95),
            p99: calculate_percentile(&sorted, 0.99),
            latest,
        })
    }

    /// Compare the latest sample against its class thresholds
    ///
    /// Returns `None` when the series is unknown, has no class, or is below all tiers.
    pub fn detect_bottleneck(&self, name: &str) -> Option<Bottleneck> {
        let class = MetricClass::classify(name)?;
        let value = self.latest_value(name)?;
        evaluate_thresholds(
            name,
            value,
            class,
            &self.config.thresholds,
            self.config.approach_ratio,
        )
    }

    /// Bottlenecks across every classifiable series, most severe first
    pub fn detect_bottlenecks(&self) -> Vec<Bottleneck> {
        let mut found: Vec<Bottleneck> = self
            .names()
            .iter()
            .filter_map(|name| self.detect_bottleneck(name))
            .collect();
        found.sort_by(|a, b| b.severity.cmp(&a.severity));
        found
    }

    /// Half-window trend of a series
    pub fn trend(&self, name: &str) -> Option<TrendAnalysis> {
        let values = self.values(name)?;
        analyze(name, &values, self.trend_settings())
    }

    fn trend_settings(&self) -> TrendSettings {
        TrendSettings {
            min_samples: self.config.trend_min_samples,
            window: self.config.trend_window,
            stable_threshold_percent: self.config.stable_threshold_percent,
            volatility_threshold: self.config.volatility_threshold,
        }
    }

    /// Pull a sample from the resource sampler and record it as `system.*` gauges
    pub fn collect_resources(&self) -> Result<ResourceSample> {
        let sample = self.sampler.sample()?;

        self.gauge(CPU_METRIC, sample.cpu_percent, "%")?;
        self.gauge(MEMORY_METRIC, sample.memory_percent(), "%")?;
        self.gauge(DISK_METRIC, sample.disk_percent(), "%")?;
        self.gauge(NETWORK_METRIC, sample.network_bytes as f64, "bytes")?;

        debug!(
            cpu = sample.cpu_percent,
            memory = sample.memory_percent(),
            "Collected resource sample"
        );
        *self.resources.write() = Some(sample.clone());
        Ok(sample)
    }

    /// The latest resource sample, if one was collected
    pub fn latest_resources(&self) -> Option<ResourceSample> {
        self.resources.read().clone()
    }

    /// Latest resource sample merged with the latest value of every series
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let metrics = self
            .series
            .read()
            .iter()
            .filter_map(|(name, s)| s.samples.back().map(|m| (name.clone(), m.value)))
            .collect();

        PerformanceSnapshot {
            timestamp: self.clock.now(),
            resources: self.latest_resources(),
            metrics,
        }
    }

    /// Advisory utilization outlook for cpu, memory and disk
    ///
    /// The projection is a straight-line extrapolation of the recent window,
    /// not a capacity model.
    pub fn capacity_signals(&self) -> Vec<CapacitySignal> {
        [("cpu", CPU_METRIC), ("memory", MEMORY_METRIC), ("disk", DISK_METRIC)]
            .iter()
            .filter_map(|(resource, metric)| {
                let values = self.values(metric)?;
                let utilization = *values.last()?;
                let window_len = self.config.trend_window.max(2).min(values.len());
                let (_, slope) = linear_regression(&values[values.len() - window_len..]);
                let headroom = (100.0 - utilization).max(0.0);
                let projected = if slope > f64::EPSILON && values.len() >= 2 {
                    Some((headroom / slope).ceil() as u64)
                } else {
                    None
                };
                Some(CapacitySignal {
                    resource: resource.to_string(),
                    utilization_percent: utilization,
                    headroom_percent: headroom,
                    slope_per_sample: slope,
                    projected_samples_to_exhaustion: projected,
                })
            })
            .collect()
    }

    pub fn clear(&self) {
        self.series.write().clear();
        *self.resources.write() = None;
    }
}
