//! Ingestion benchmarks for pipeline-monitor
//!
//! Measures the hot producer paths: event emission, error fingerprinting and
//! metric recording.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pipeline_monitor::config::{ErrorTrackingConfig, EventLogConfig, MetricsConfig};
use pipeline_monitor::monitoring::errors::{ErrorContext, ErrorFingerprintIndex};
use pipeline_monitor::monitoring::events::{Event, EventError, StructuredEventLog};
use pipeline_monitor::monitoring::metrics::{MetricKind, MetricsStore, StaticSampler};
use pipeline_monitor::utils::time::SystemClock;
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;

const STACK: &str = "at call_provider (router.rs:120)\n\
                     at route (router.rs:88)\n\
                     at handle (server.rs:40)\n\
                     at serve (server.rs:12)";

fn event_log() -> Arc<StructuredEventLog> {
    Arc::new(StructuredEventLog::new(
        EventLogConfig::default(),
        Arc::new(SystemClock),
        None,
    ))
}

/// Benchmark event emission
fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_emit");
    group.throughput(Throughput::Elements(1));

    let log = event_log();
    group.bench_function("info", |b| {
        b.iter(|| {
            black_box(log.emit(
                Event::info("gateway", "routing request")
                    .with_correlation("bench-correlation")
                    .with_tag("route"),
            ))
        })
    });

    group.bench_function("below_min_level", |b| {
        b.iter(|| black_box(log.emit(Event::debug("gateway", "dropped"))))
    });

    group.finish();
}

/// Benchmark error fingerprinting against a growing index
fn bench_track_error(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_track");

    for distinct in [1usize, 100, 1000] {
        let index = ErrorFingerprintIndex::new(
            ErrorTrackingConfig::default(),
            Arc::new(SystemClock),
            event_log(),
        );
        let errors: Vec<EventError> = (0..distinct)
            .map(|i| EventError {
                name: "ProviderTimeout".to_string(),
                message: format!("upstream {} gave up", i),
                stack: Some(STACK.to_string()),
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(distinct),
            &errors,
            |b, errors| {
                let mut i = 0;
                b.iter(|| {
                    let error = &errors[i % errors.len()];
                    i += 1;
                    black_box(index.track(
                        error,
                        ErrorContext::for_correlation("bench-correlation"),
                        BTreeMap::new(),
                    ))
                })
            },
        );
    }

    group.finish();
}

/// Benchmark metric recording into bounded series
fn bench_record_metric(c: &mut Criterion) {
    let mut group = c.benchmark_group("metric_record");
    group.throughput(Throughput::Elements(1));

    let store = MetricsStore::new(
        MetricsConfig::default(),
        Arc::new(SystemClock),
        Arc::new(StaticSampler::default()),
    );
    let tags = BTreeMap::from([("pipeline".to_string(), "chat".to_string())]);

    group.bench_function("timer", |b| {
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            black_box(store.record(
                "pipeline.duration_ms",
                MetricKind::Timer,
                value,
                "ms",
                tags.clone(),
            ))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_emit, bench_track_error, bench_record_metric);
criterion_main!(benches);
