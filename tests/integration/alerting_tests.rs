//! Alerting integration tests
//!
//! Metrics recorded through the service drive rule evaluation, and queued
//! notifications reach configured and registered channels.

#[cfg(test)]
mod tests {
    use crate::common::{RecordingChannel, RuleFactory, ServiceFixture};
    use crate::assert_ok;
    use pipeline_monitor::config::{ChannelConfig, ChannelKind};
    use pipeline_monitor::monitoring::AlertSeverity;
    use pipeline_monitor::monitoring::alerts::{
        AlertStatus, ChannelSettings, EvaluationOutcome,
    };
    use pipeline_monitor::monitoring::metrics::MetricKind;
    use pipeline_monitor::{MonitoringEvent, ObservabilityConfig};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record_error_rate(f: &ServiceFixture, value: f64) {
        assert_ok!(f.service.record_metric(
            "error_rate",
            MetricKind::Gauge,
            value,
            "%",
            BTreeMap::from([("service".to_string(), "gateway".to_string())]),
        ));
    }

    #[tokio::test]
    async fn test_alert_lifecycle_through_channels() {
        let alert_dir = tempfile::tempdir().unwrap();
        let alert_file = alert_dir.path().join("alerts.jsonl");

        let mut config = ObservabilityConfig::default();
        config.alerting.channels.push(ChannelConfig {
            name: "ops-log".to_string(),
            kind: ChannelKind::LogFile {
                path: alert_file.clone(),
            },
            settings: ChannelSettings::default(),
        });
        config.alerting.rules.push(
            RuleFactory::escalating(60).with_channels(["ops-log", "recorder"]),
        );
        let f = ServiceFixture::with_config(config).await;

        let recorder = RecordingChannel::new("recorder");
        let pager = RecordingChannel::new("pager");
        let dispatcher = f.service.alerts().dispatcher();
        assert_ok!(dispatcher.register(recorder.clone(), ChannelSettings::default()).await);
        assert_ok!(dispatcher.register(pager.clone(), ChannelSettings::default()).await);
        let mut rx = f.service.subscribe();

        record_error_rate(&f, 12.0);
        let outcomes = f.service.alerts().evaluate_rules();
        assert_eq!(outcomes.len(), 1);
        let alert = match &outcomes[0] {
            EvaluationOutcome::Created(alert) => alert.clone(),
            other => panic!("expected a new alert, got {:?}", other),
        };
        assert_eq!(alert.status, AlertStatus::Firing);
        assert!(alert.tags.contains("gateway"));

        let results = f.service.alerts().process_pending().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(recorder.received().len(), 1);
        let written = std::fs::read_to_string(&alert_file).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("high-error-rate"));

        f.clock.advance(Duration::from_secs(61));
        let escalated = f.service.alerts().check_escalation();
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].severity, AlertSeverity::Critical);
        // a second check finds nothing left to escalate
        assert!(f.service.alerts().check_escalation().is_empty());

        f.service.alerts().process_pending().await;
        let paged = pager.received();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].escalation_level, 1);
        assert_eq!(recorder.received().len(), 1);

        // let the high sample age out of the window before the condition clears
        f.clock.advance(Duration::from_secs(301));
        record_error_rate(&f, 1.0);
        let outcomes = f.service.alerts().evaluate_rules();
        assert!(matches!(outcomes.as_slice(), [EvaluationOutcome::Resolved(_)]));
        f.service.alerts().process_pending().await;
        assert_eq!(recorder.received().len(), 2);
        assert_eq!(recorder.received()[1].status, AlertStatus::Resolved);
        assert_eq!(std::fs::read_to_string(&alert_file).unwrap().lines().count(), 2);

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if matches!(
                event,
                MonitoringEvent::AlertCreated(_)
                    | MonitoringEvent::AlertEscalated(_)
                    | MonitoringEvent::AlertResolved(_)
            ) {
                names.push(event.name());
            }
        }
        assert_eq!(names, vec!["alert_created", "alert_escalated", "alert_resolved"]);

        let stats = f.service.alerts().stats();
        assert_eq!(stats.total_alerts, 1);
        assert_eq!(stats.escalations, 1);
        assert_eq!(stats.failed_notifications, 0);
    }

    #[tokio::test]
    async fn test_webhook_channel_from_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/alerts"))
            .and(body_partial_json(serde_json::json!({
                "event": "alert",
                "status": "firing",
                "alert": { "rule_id": "high-error-rate" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ObservabilityConfig::default();
        config.alerting.channels.push(ChannelConfig {
            name: "hook".to_string(),
            kind: ChannelKind::Webhook {
                url: format!("{}/hooks/alerts", server.uri()),
                headers: HashMap::new(),
            },
            settings: ChannelSettings::default(),
        });
        config
            .alerting
            .rules
            .push(RuleFactory::error_rate().with_channels(["hook"]));
        let f = ServiceFixture::with_config(config).await;

        record_error_rate(&f, 9.0);
        assert_eq!(f.service.alerts().evaluate_rules().len(), 1);
        let results = f.service.alerts().process_pending().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success, "{:?}", results[0].error);
    }

    #[tokio::test]
    async fn test_config_rules_load_from_yaml() {
        let yaml = r#"
service_name: gateway
alerting:
  channels:
    - name: console
      type: console
  rules:
    - id: slow-pipelines
      name: Slow pipelines
      condition:
        metric: pipeline.duration_ms
        operator: gt
        threshold: 2000
        time_window_secs: 120
      severity: critical
      channels: [console]
"#;
        let config = assert_ok!(ObservabilityConfig::from_yaml(yaml));
        let f = ServiceFixture::with_config(config).await;

        let rule = f.service.alerts().rule("slow-pipelines").unwrap();
        assert_eq!(rule.severity, AlertSeverity::Critical);
        assert_eq!(rule.condition.time_window_secs, 120);
        assert_eq!(
            f.service.alerts().dispatcher().channel_names().await,
            vec!["console".to_string()]
        );

        // nothing recorded yet, so the rule is skipped
        assert!(f.service.alerts().evaluate_rules().is_empty());
        assert_ok!(f.service.record_metric(
            "pipeline.duration_ms",
            MetricKind::Timer,
            3500.0,
            "ms",
            BTreeMap::new(),
        ));
        let outcomes = f.service.alerts().evaluate_rules();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].alert().unwrap().severity, AlertSeverity::Critical);
    }
}
