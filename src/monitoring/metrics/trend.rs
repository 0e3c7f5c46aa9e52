//! Half-window trend heuristic

use super::helpers::{calculate_average, linear_regression, residual_std_dev};
use super::types::{TrendAnalysis, TrendDirection};

/// Parameters of the trend heuristic
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrendSettings {
    pub min_samples: usize,
    pub window: usize,
    pub stable_threshold_percent: f64,
    pub volatility_threshold: f64,
}

/// Metrics where a rising value is good news
pub(crate) fn higher_is_better(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["throughput", "success", "hit_rate", "availability"]
        .iter()
        .any(|k| name.contains(k))
}

/// Classify the most recent window of `values` (arrival order)
///
/// Returns `None` with fewer than `min_samples` values.
pub(crate) fn analyze(
    metric: &str,
    values: &[f64],
    settings: TrendSettings,
) -> Option<TrendAnalysis> {
    if values.len() < settings.min_samples.max(2) {
        return None;
    }

    let window_len = settings.window.max(2).min(values.len());
    let window = &values[values.len() - window_len..];
    let mid = window.len() / 2;
    let older = calculate_average(&window[..mid]);
    let newer = calculate_average(&window[mid..]);

    let change_percent = percent_change(older, newer);
    let mean = calculate_average(window);
    let noise = if mean.abs() < f64::EPSILON {
        0.0
    } else {
        residual_std_dev(window) / mean.abs()
    };

    let direction = if noise > settings.volatility_threshold {
        TrendDirection::Volatile
    } else if change_percent.abs() < settings.stable_threshold_percent {
        TrendDirection::Stable
    } else if (change_percent > 0.0) == higher_is_better(metric) {
        TrendDirection::Improving
    } else {
        TrendDirection::Degrading
    };

    let (intercept, slope) = linear_regression(window);
    let prediction = intercept + slope * window.len() as f64;

    Some(TrendAnalysis {
        metric: metric.to_string(),
        direction,
        change_percent,
        confidence: (change_percent.abs() / 100.0).min(1.0),
        prediction,
        samples: window.len(),
    })
}

fn percent_change(older: f64, newer: f64) -> f64 {
    if older.abs() < f64::EPSILON {
        if newer.abs() < f64::EPSILON {
            0.0
        } else {
            100.0 * newer.signum()
        }
    } else {
        (newer - older) / older.abs() * 100.0
    }
}
