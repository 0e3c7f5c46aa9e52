//! Tests for the observability service

use super::*;
use crate::config::{FileSinkConfig, ObservabilityConfig};
use crate::monitoring::alerts::{AlertRule, ComparisonOperator};
use crate::monitoring::events::{DailyFileSink, Event, EventQuery};
use crate::monitoring::metrics::{CPU_METRIC, MetricKind, ResourceSample, StaticSampler};
use crate::monitoring::traces::{SpanKind, SpanStatus};
use crate::utils::time::{Clock, ManualClock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

async fn service_with(config: ObservabilityConfig) -> (ObservabilityService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let service = ObservabilityService::with_clock(
        config,
        clock.clone(),
        Arc::new(StaticSampler::default()),
    )
    .await
    .unwrap();
    (service, clock)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<MonitoringEvent>) -> Vec<MonitoringEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

// ==== Lifecycle Tests ====

#[tokio::test]
async fn test_start_schedules_all_tasks() {
    let (service, _) = service_with(ObservabilityConfig::default()).await;
    assert!(!service.is_running());

    service.start().unwrap();
    assert!(service.is_running());
    assert_eq!(
        service.scheduled_tasks(),
        vec![
            "correlation_sweep",
            "error_retention",
            "escalation_check",
            "event_flush",
            "metrics_collection",
            "notification_processing",
            "rule_evaluation",
            "suppression_sweep",
        ]
    );

    // starting twice changes nothing
    service.start().unwrap();
    assert_eq!(service.scheduled_tasks().len(), 8);

    service.stop().await.unwrap();
    assert!(!service.is_running());
    assert!(service.scheduled_tasks().is_empty());
}

#[tokio::test]
async fn test_stop_keeps_state_and_destroy_clears_it() {
    let (service, _) = service_with(ObservabilityConfig::default()).await;
    service.start().unwrap();

    let correlation_id = service.new_correlation(BTreeMap::new());
    service.emit(Event::info("api", "request received").with_correlation(&correlation_id));
    service
        .record_metric("latency_ms", MetricKind::Timer, 120.0, "ms", BTreeMap::new())
        .unwrap();

    service.stop().await.unwrap();
    assert!(service.correlation().get(&correlation_id).is_some());
    assert_eq!(
        service
            .events()
            .query(&EventQuery::for_correlation(&correlation_id))
            .len(),
        1
    );
    assert!(service.metrics().latest("latency_ms").is_some());

    // restart after stop
    service.start().unwrap();
    assert!(service.is_running());

    service.destroy().await.unwrap();
    assert!(!service.is_running());
    assert!(service.correlation().is_empty());
    assert!(service.events().query(&EventQuery::new()).is_empty());
    assert!(service.metrics().latest("latency_ms").is_none());
}

#[tokio::test]
async fn test_stop_flushes_to_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ObservabilityConfig::default();
    config.events.file = Some(FileSinkConfig {
        directory: dir.path().to_path_buf(),
        prefix: "pipeline".to_string(),
    });
    let (service, clock) = service_with(config).await;
    service.start().unwrap();

    service.emit(Event::info("api", "first"));
    service.emit(Event::warn("api", "second"));
    service.stop().await.unwrap();

    let sink = DailyFileSink::new(dir.path(), "pipeline");
    let contents = std::fs::read_to_string(sink.path_for(clock.now().date_naive())).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("first"));
    assert!(lines[1].contains("second"));
    assert_eq!(service.events().buffered(), 0);
}

#[tokio::test]
async fn test_alert_tasks_follow_alerting_switch() {
    let mut config = ObservabilityConfig::default();
    config.alerting.enabled = false;
    let (service, _) = service_with(config.clone()).await;
    service.start().unwrap();
    assert!(!service.scheduled_tasks().contains(&"rule_evaluation".to_string()));
    assert_eq!(service.scheduled_tasks().len(), 4);

    config.alerting.enabled = true;
    service.update_config(config.clone()).unwrap();
    assert_eq!(service.scheduled_tasks().len(), 8);

    config.alerting.enabled = false;
    service.update_config(config).unwrap();
    assert_eq!(service.scheduled_tasks().len(), 4);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn test_update_config_rejects_invalid_config() {
    let (service, _) = service_with(ObservabilityConfig::default()).await;
    let mut config = ObservabilityConfig::default();
    config.events.flush_interval_secs = 0;

    assert!(service.update_config(config).is_err());
    assert_eq!(service.config().events.flush_interval_secs, 5);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_construction() {
    let config = ObservabilityConfig {
        bus_capacity: 0,
        ..ObservabilityConfig::default()
    };
    let result = ObservabilityService::with_clock(
        config,
        Arc::new(ManualClock::starting_now()),
        Arc::new(StaticSampler::default()),
    )
    .await;
    assert!(result.is_err());
}

// ==== Producer Tests ====

#[tokio::test]
async fn test_error_events_are_tracked_and_published() {
    let (service, _) = service_with(ObservabilityConfig::default()).await;
    let mut rx = service.subscribe();
    let correlation_id = service.new_correlation(BTreeMap::new());

    for _ in 0..2 {
        service.emit(
            Event::error("api", "upstream call failed")
                .with_correlation(&correlation_id)
                .with_metadata("user_id", serde_json::json!("user-7"))
                .with_error("TimeoutError", "request timed out after 30s", None),
        );
    }
    // warnings with an error payload are not tracked
    service.emit(Event::warn("api", "slow").with_error("SlowCall", "took 2s", None));

    let records = service.errors().search(&Default::default());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].occurrence_count, 2);
    assert!(records[0].affected_users.contains("user-7"));
    assert!(records[0].affected_correlation_ids.contains(&correlation_id));

    let tracked: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            MonitoringEvent::ErrorTracked(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(tracked.len(), 2);
    assert!(tracked[0].is_new);
    assert!(!tracked[1].is_new);
}

#[tokio::test]
async fn test_closed_pipeline_is_published_and_timed() {
    let (service, clock) = service_with(ObservabilityConfig::default()).await;
    let mut rx = service.subscribe();
    let correlation_id = service.new_correlation(BTreeMap::new());

    let root = service
        .start_span(&correlation_id, "ingest", SpanKind::Pipeline, None)
        .unwrap();
    let stage = service
        .start_span(&correlation_id, "parse", SpanKind::Stage, Some(&root))
        .unwrap();
    clock.advance(Duration::from_millis(250));
    assert_eq!(
        service.end_span(&stage, SpanStatus::Completed, None).unwrap(),
        250
    );
    clock.advance(Duration::from_millis(50));

    let trace = service
        .close_pipeline(&correlation_id, SpanStatus::Completed)
        .unwrap();
    assert_eq!(trace.spans.len(), 2);
    assert_eq!(
        service.metrics().latest_value("pipeline.duration_ms"),
        Some(300.0)
    );

    let closed = drain(&mut rx)
        .into_iter()
        .any(|e| matches!(e, MonitoringEvent::PipelineClosed(t) if t.correlation_id == correlation_id));
    assert!(closed);
}

#[tokio::test]
async fn test_collect_metrics_publishes_bottlenecks() {
    let clock = Arc::new(ManualClock::starting_now());
    let sampler = Arc::new(StaticSampler::new(ResourceSample {
        cpu_percent: 95.0,
        ..ResourceSample::default()
    }));
    let service =
        ObservabilityService::with_clock(ObservabilityConfig::default(), clock, sampler)
            .await
            .unwrap();
    let mut rx = service.subscribe();

    let bottlenecks = service.collect_metrics();
    let cpu = bottlenecks
        .iter()
        .find(|b| b.metric == CPU_METRIC)
        .expect("cpu bottleneck");
    assert_eq!(cpu.severity, BottleneckSeverity::Critical);

    let published = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, MonitoringEvent::BottleneckDetected(_)))
        .count();
    assert_eq!(published, bottlenecks.len());
}

#[tokio::test]
async fn test_retention_keeps_correlations_with_open_spans() {
    let (service, clock) = service_with(ObservabilityConfig::default()).await;
    let idle = service.new_correlation(BTreeMap::new());
    let busy = service.new_correlation(BTreeMap::new());
    service
        .start_span(&busy, "long-running", SpanKind::Pipeline, None)
        .unwrap();

    clock.advance(Duration::from_secs(3601));
    let report = service.run_retention();

    assert_eq!(report.correlations, 1);
    assert!(service.correlation().get(&idle).is_none());
    assert!(service.correlation().get(&busy).is_some());
}

#[tokio::test]
async fn test_rules_evaluate_against_recorded_metrics() {
    let mut config = ObservabilityConfig::default();
    config.alerting.rules.push(AlertRule::new(
        "latency",
        "latency_ms",
        ComparisonOperator::GreaterThan,
        500.0,
    ));
    let (service, _) = service_with(config).await;
    let mut rx = service.subscribe();

    for value in [700.0, 900.0] {
        service
            .record_metric("latency_ms", MetricKind::Timer, value, "ms", BTreeMap::new())
            .unwrap();
    }
    let outcomes = service.alerts().evaluate_rules();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].alert().unwrap().value, 800.0);
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, MonitoringEvent::AlertCreated(_)))
    );
}
