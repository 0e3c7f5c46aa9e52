//! Bottleneck and parallelization analysis of a closed pipeline

use super::types::{
    ParallelizationOpportunity, PipelineAnalysis, SpanBottleneck, SpanShare, TraceSpan,
};
use crate::config::TraceConfig;
use crate::monitoring::types::{Bottleneck, BottleneckSeverity};

/// Analyse the spans of one pipeline
///
/// `total_ms` is the pipeline duration used for the percent-of-total shares.
pub(crate) fn analyze_pipeline(
    spans: &[TraceSpan],
    total_ms: u64,
    config: &TraceConfig,
) -> PipelineAnalysis {
    let span_breakdown = spans
        .iter()
        .map(|span| {
            let duration_ms = span.duration_ms.unwrap_or(0);
            SpanShare {
                span_id: span.id.clone(),
                name: span.name.clone(),
                duration_ms,
                percent_of_total: if total_ms == 0 {
                    0.0
                } else {
                    duration_ms as f64 * 100.0 / total_ms as f64
                },
            }
        })
        .collect();

    let mut bottlenecks: Vec<SpanBottleneck> =
        spans.iter().flat_map(|s| span_bottlenecks(s, config)).collect();
    bottlenecks.sort_by(|a, b| b.bottleneck.severity.cmp(&a.bottleneck.severity));

    PipelineAnalysis {
        total_duration_ms: total_ms,
        span_breakdown,
        bottlenecks,
        parallelization: parallelization(spans, config.parallel_savings_percent),
    }
}

/// Duration tier of a span: critical above the error threshold, high above the warning one
pub(crate) fn duration_severity(
    duration_ms: u64,
    config: &TraceConfig,
) -> Option<(BottleneckSeverity, u64)> {
    if duration_ms > config.duration_error_ms {
        Some((BottleneckSeverity::Critical, config.duration_error_ms))
    } else if duration_ms > config.duration_warning_ms {
        Some((BottleneckSeverity::High, config.duration_warning_ms))
    } else {
        None
    }
}

fn span_bottlenecks(span: &TraceSpan, config: &TraceConfig) -> Vec<SpanBottleneck> {
    let mut found = Vec::new();
    let mut push = |bottleneck: Bottleneck| {
        found.push(SpanBottleneck {
            span_id: span.id.clone(),
            span_name: span.name.clone(),
            bottleneck,
        })
    };

    if let Some(duration_ms) = span.duration_ms {
        if let Some((severity, threshold)) = duration_severity(duration_ms, config) {
            push(Bottleneck {
                metric: "duration_ms".to_string(),
                severity,
                current_value: duration_ms as f64,
                threshold: threshold as f64,
                recommendation: format!(
                    "Span '{}' took {}ms; consider caching, batching or splitting it",
                    span.name, duration_ms
                ),
            });
        }
    }

    if let Some(perf) = &span.performance {
        if perf.memory_mb > config.memory_threshold_mb {
            push(Bottleneck {
                metric: "memory_mb".to_string(),
                severity: BottleneckSeverity::Medium,
                current_value: perf.memory_mb,
                threshold: config.memory_threshold_mb,
                recommendation: "Reduce in-memory payloads or stream intermediate results"
                    .to_string(),
            });
        }
        if perf.cpu_percent > config.cpu_threshold_percent {
            push(Bottleneck {
                metric: "cpu_percent".to_string(),
                severity: BottleneckSeverity::Medium,
                current_value: perf.cpu_percent,
                threshold: config.cpu_threshold_percent,
                recommendation: "Move CPU-heavy work off the request path".to_string(),
            });
        }
    }

    found
}

/// Non-root spans with no recorded dependency can run concurrently
fn parallelization(
    spans: &[TraceSpan],
    savings_percent: f64,
) -> Option<ParallelizationOpportunity> {
    let span_ids: Vec<String> = spans
        .iter()
        .filter(|s| !s.is_root() && s.dependencies.is_empty())
        .map(|s| s.id.clone())
        .collect();

    if span_ids.len() < 2 {
        return None;
    }

    let estimated_savings_percent = (span_ids.len() as f64 * savings_percent).min(100.0);
    Some(ParallelizationOpportunity {
        span_ids,
        estimated_savings_percent,
        advisory: true,
    })
}
