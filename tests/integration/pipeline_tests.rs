//! Pipeline trace integration tests
//!
//! Drives correlation, span and event recording through the service and
//! checks the closed trace, its analysis and the emitted events.

#[cfg(test)]
mod tests {
    use crate::common::{EventFactory, ServiceFixture};
    use crate::{assert_err, assert_ok};
    use pipeline_monitor::{ObservabilityConfig, ObservabilityError};
    use pipeline_monitor::monitoring::BottleneckSeverity;
    use pipeline_monitor::monitoring::events::{EventLevel, EventQuery, SPAN_END_TAG, SPAN_START_TAG};
    use pipeline_monitor::monitoring::traces::{SpanKind, SpanStatus};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn origin() -> BTreeMap<String, serde_json::Value> {
        BTreeMap::from([
            ("route".to_string(), json!("/v1/chat/completions")),
            ("model".to_string(), json!("gpt-4o")),
        ])
    }

    // ==================== Trace Tree ====================

    #[tokio::test]
    async fn test_full_pipeline_trace() {
        let f = ServiceFixture::new().await;
        let service = &f.service;
        let correlation_id = service.new_correlation(origin());

        let root = assert_ok!(service.start_span(&correlation_id, "chat", SpanKind::Pipeline, None));
        let auth = assert_ok!(service.start_span(&correlation_id, "auth", SpanKind::Stage, Some(&root)));
        f.clock.advance(Duration::from_millis(20));
        assert_ok!(service.end_span(&auth, SpanStatus::Completed, None));

        let provider = assert_ok!(service.start_span(
            &correlation_id,
            "provider",
            SpanKind::Stage,
            Some(&root)
        ));
        assert_ok!(service.traces().add_dependency(&provider, &auth));
        let call = assert_ok!(service.start_span(
            &correlation_id,
            "http-call",
            SpanKind::Operation,
            Some(&provider)
        ));
        assert_ok!(service.traces().mark_running(&call));
        f.clock.advance(Duration::from_millis(6_000));
        assert_ok!(service.end_span(&call, SpanStatus::Completed, None));
        assert_ok!(service.end_span(&provider, SpanStatus::Completed, None));
        assert_ok!(service.end_span(&root, SpanStatus::Completed, None));

        let trace = assert_ok!(service.close_pipeline(&correlation_id, SpanStatus::Completed));
        assert_eq!(trace.name, "chat");
        assert_eq!(trace.spans.len(), 4);
        assert_eq!(trace.span(&root).unwrap().children, vec![auth.clone(), provider.clone()]);
        assert_eq!(trace.span(&provider).unwrap().children, vec![call.clone()]);

        let analysis = trace.analysis.as_ref().unwrap();
        assert_eq!(analysis.total_duration_ms, 6_020);
        // both the provider stage and its call crossed the warning threshold
        let slow: Vec<&str> = analysis
            .bottlenecks
            .iter()
            .map(|b| b.span_name.as_str())
            .collect();
        assert!(slow.contains(&"provider"));
        assert!(slow.contains(&"http-call"));
        assert!(
            analysis
                .bottlenecks
                .iter()
                .all(|b| b.bottleneck.severity == BottleneckSeverity::High)
        );

        // auth and http-call have no dependencies; provider waits on auth
        let parallel = analysis.parallelization.as_ref().unwrap();
        assert!(parallel.advisory);
        assert_eq!(parallel.span_ids.len(), 2);
        assert!(!parallel.span_ids.contains(&provider));
        assert_eq!(parallel.estimated_savings_percent, 30.0);

        assert!(service.traces().get_pipeline(&correlation_id).is_some());
        assert!(service.traces().active_pipelines().is_empty());
        assert_eq!(service.traces().history(Some(1))[0].correlation_id, correlation_id);
    }

    #[tokio::test]
    async fn test_span_events_share_correlation_id() {
        let mut config = ObservabilityConfig::default();
        config.events.min_level = EventLevel::Debug;
        let f = ServiceFixture::with_config(config).await;
        let service = &f.service;
        let correlation_id = service.new_correlation(origin());

        let root = assert_ok!(service.start_span(&correlation_id, "embed", SpanKind::Pipeline, None));
        service.emit(EventFactory::info(&f.clock, &correlation_id, "tokenizing input"));
        assert_ok!(service.end_span(&root, SpanStatus::Completed, None));
        assert_ok!(service.close_pipeline(&correlation_id, SpanStatus::Completed));

        let events = service
            .events()
            .query(&EventQuery::for_correlation(&correlation_id));
        assert!(events.len() >= 4);
        assert!(events.iter().all(|e| e.correlation_id.as_deref() == Some(&correlation_id)));
        assert!(events[0].tags.contains(SPAN_START_TAG));
        assert!(events.iter().any(|e| e.tags.contains(SPAN_END_TAG)));
        // emission order is preserved
        let timestamps: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[tokio::test]
    async fn test_closing_pipeline_cancels_open_spans() {
        let f = ServiceFixture::new().await;
        let service = &f.service;
        let correlation_id = service.new_correlation(origin());

        let root = assert_ok!(service.start_span(&correlation_id, "batch", SpanKind::Pipeline, None));
        let stuck = assert_ok!(service.start_span(&correlation_id, "stuck", SpanKind::Stage, Some(&root)));
        assert!(service.traces().has_open_spans(&correlation_id));

        let trace = assert_ok!(service.close_pipeline(&correlation_id, SpanStatus::Failed));
        assert_eq!(trace.status, SpanStatus::Failed);
        assert_eq!(trace.span(&stuck).unwrap().status, SpanStatus::Cancelled);
        assert!(trace.spans.iter().all(|s| s.end_time.is_some()));
        assert!(!service.traces().has_open_spans(&correlation_id));
    }

    #[tokio::test]
    async fn test_span_ordering_and_double_close() {
        let f = ServiceFixture::new().await;
        let service = &f.service;
        let correlation_id = service.new_correlation(origin());

        let err = assert_err!(service.start_span(
            &correlation_id,
            "orphan",
            SpanKind::Stage,
            Some("no-such-span")
        ));
        assert!(matches!(err, ObservabilityError::NotFound(_)));

        let root = assert_ok!(service.start_span(&correlation_id, "job", SpanKind::Pipeline, None));
        f.clock.advance(Duration::from_millis(40));
        assert_eq!(assert_ok!(service.end_span(&root, SpanStatus::Completed, None)), 40);

        let err = assert_err!(service.end_span(&root, SpanStatus::Failed, None));
        assert!(matches!(err, ObservabilityError::SpanAlreadyClosed(_)));
        assert!(err.is_logic());
        assert_eq!(
            service.traces().get_span(&root).unwrap().status,
            SpanStatus::Completed
        );
    }

    // ==================== Correlation ====================

    #[tokio::test]
    async fn test_correlation_context_and_sweep() {
        let f = ServiceFixture::new().await;
        let service = &f.service;
        let first = service.new_correlation(origin());
        let second = service.new_correlation(BTreeMap::new());
        assert_ne!(first, second);
        assert_eq!(
            service.correlation().get(&first).unwrap().origin["model"],
            json!("gpt-4o")
        );

        f.clock.advance(Duration::from_secs(3_000));
        service.emit(EventFactory::info(&f.clock, &second, "still busy"));
        f.clock.advance(Duration::from_secs(1_000));

        let report = service.run_retention();
        assert_eq!(report.correlations, 1);
        assert!(service.correlation().get(&first).is_none());
        assert!(service.correlation().get(&second).is_some());
    }
}
