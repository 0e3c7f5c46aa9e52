//! Event log integration tests
//!
//! Exercises flushing to real sinks: daily files on disk and a mock remote
//! collector that fails and recovers.

#[cfg(test)]
mod tests {
    use crate::common::{EventFactory, ServiceFixture};
    use crate::{assert_err, assert_ok};
    use pipeline_monitor::ObservabilityConfig;
    use pipeline_monitor::config::{EventLogConfig, RemoteSinkConfig};
    use pipeline_monitor::monitoring::events::{
        DailyFileSink, Event, EventLevel, EventSink, HttpSink, MALFORMED_TAG, StructuredEventLog,
    };
    use pipeline_monitor::utils::time::{Clock, ManualClock};
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn log_with_sink(config: EventLogConfig, sink: Arc<dyn EventSink>) -> StructuredEventLog {
        StructuredEventLog::new(
            config,
            Arc::new(ManualClock::starting_now()),
            Some(sink),
        )
    }

    // ==================== Remote Collector ====================

    #[tokio::test]
    async fn test_failed_remote_flush_keeps_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("content-type", "application/x-ndjson"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = assert_ok!(HttpSink::new(
            format!("{}/ingest", server.uri()),
            Duration::from_secs(5)
        ));
        let log = log_with_sink(EventLogConfig::default(), Arc::new(sink));
        log.emit(Event::info("gateway", "first"));
        log.emit(Event::info("gateway", "second"));

        let err = assert_err!(log.flush().await);
        assert!(err.to_string().contains("500"));
        assert_eq!(log.buffered(), 2);
        assert_eq!(log.stats().failed_flushes, 1);

        log.emit(Event::info("gateway", "third"));
        let report = assert_ok!(log.flush().await);
        assert_eq!(report.flushed, 3);
        assert_eq!(log.buffered(), 0);

        let requests = server.received_requests().await.unwrap_or_default();
        let delivered = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        let lines: Vec<&str> = delivered.lines().collect();
        assert_eq!(lines.len(), 3);
        // the restored batch goes out ahead of newer events
        assert!(lines[0].contains("first"));
        assert!(lines[2].contains("third"));
    }

    // ==================== Daily Files ====================

    #[tokio::test]
    async fn test_events_rotate_by_day() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DailyFileSink::new(dir.path(), "pipeline");
        let clock = ManualClock::starting_now();
        let today = clock.now();
        let tomorrow = today + chrono::Duration::days(1);

        let log = log_with_sink(EventLogConfig::default(), Arc::new(sink.clone()));
        log.emit(Event::info("gateway", "before midnight").with_timestamp(today));
        log.emit(Event::info("gateway", "after midnight").with_timestamp(tomorrow));
        log.emit(Event::info("gateway", "also before").with_timestamp(today));
        assert_eq!(assert_ok!(log.flush().await).flushed, 3);

        let first = std::fs::read_to_string(sink.path_for(today.date_naive())).unwrap();
        let second = std::fs::read_to_string(sink.path_for(tomorrow.date_naive())).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert_eq!(second.lines().count(), 1);
        assert!(second.contains("after midnight"));

        for line in first.lines().chain(second.lines()) {
            let event: Event = serde_json::from_str(line).unwrap();
            assert_eq!(event.service, "gateway");
        }
    }

    #[tokio::test]
    async fn test_oversized_event_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DailyFileSink::new(dir.path(), "events");
        let config = EventLogConfig {
            max_line_bytes: 512,
            ..EventLogConfig::default()
        };
        let log = log_with_sink(config, Arc::new(sink.clone()));

        log.emit(Event::info("gateway", "small"));
        log.emit(
            Event::info("gateway", "bulky")
                .with_metadata("payload", serde_json::json!("x".repeat(2048))),
        );
        log.emit(Event::info("gateway", "also small"));

        let report = assert_ok!(log.flush().await);
        assert_eq!(report.flushed, 2);
        assert_eq!(report.malformed, 1);

        let malformed = log.malformed_events();
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].event.message, "bulky");
        assert!(malformed[0].event.tags.contains(MALFORMED_TAG));
        assert!(malformed[0].reason.contains("512"));

        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 1);
        assert_eq!(log.buffered(), 0);
    }

    // ==================== Through the Service ====================

    #[tokio::test]
    async fn test_min_level_filters_service_events() {
        let mut config = ObservabilityConfig::default();
        config.events.min_level = EventLevel::Warn;
        let f = ServiceFixture::with_config(config).await;

        assert!(f.service.emit(EventFactory::info(&f.clock, "c-1", "chatty")).is_none());
        assert!(
            f.service
                .emit(Event::warn("gateway", "slow upstream").with_timestamp(f.clock.now()))
                .is_some()
        );

        assert_ok!(f.service.stop().await);
        let lines = f.log_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("slow upstream"));

        let stats = f.service.events().stats();
        assert_eq!(stats.dropped_below_level, 1);
        assert_eq!(stats.flushed, 1);
    }

    #[tokio::test]
    async fn test_stop_during_slow_write_keeps_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let mut config = ObservabilityConfig::default();
        config.events.flush_interval_secs = 1;
        config.events.remote = Some(RemoteSinkConfig {
            url: format!("{}/ingest", server.uri()),
            timeout_secs: 10,
        });
        let f = ServiceFixture::with_config(config).await;
        assert_ok!(f.service.start());

        f.service.emit(EventFactory::info(&f.clock, "c-slow", "first"));
        f.service.emit(EventFactory::info(&f.clock, "c-slow", "second"));

        // the periodic flush is now waiting on the collector
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_ok!(f.service.stop().await);

        let stats = f.service.events().stats();
        assert!(stats.emitted >= 2);
        assert_eq!(stats.flushed, stats.emitted);
        assert_eq!(stats.failed_flushes, 0);
        assert_eq!(f.service.events().buffered(), 0);

        let requests = server.received_requests().await.unwrap_or_default();
        let delivered = String::from_utf8_lossy(&requests.last().unwrap().body).to_string();
        assert_eq!(delivered.lines().count() as u64, stats.emitted);
        assert!(delivered.contains("first"));
        assert!(delivered.contains("second"));
    }

    #[tokio::test]
    async fn test_batch_size_wakes_flush_task() {
        let mut config = ObservabilityConfig::default();
        config.events.flush_batch_size = 3;
        config.events.flush_interval_secs = 3600;
        let f = ServiceFixture::with_config(config).await;
        assert_ok!(f.service.start());

        for i in 0..3 {
            f.service
                .emit(EventFactory::info(&f.clock, "c-batch", &format!("event {}", i)));
        }

        let mut flushed = 0;
        for _ in 0..50 {
            flushed = f.service.events().stats().flushed;
            if flushed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(flushed, 3);
        assert_eq!(f.log_lines().len(), 3);
        assert_ok!(f.service.stop().await);
    }
}
