//! Error tracking integration tests
//!
//! Error events emitted through the service are fingerprinted, deduplicated
//! and aged out of the index.

#[cfg(test)]
mod tests {
    use crate::assert_ok;
    use crate::common::{EventFactory, ServiceFixture};
    use pipeline_monitor::MonitoringEvent;
    use pipeline_monitor::monitoring::errors::{
        ErrorCategory, ErrorFilter, ErrorSeverity, ErrorStatus, ResolveOutcome,
    };
    use std::time::Duration;

    #[tokio::test]
    async fn test_repeated_errors_share_a_record() {
        let f = ServiceFixture::new().await;
        let mut rx = f.service.subscribe();

        for correlation_id in ["c-1", "c-2", "c-3"] {
            f.service.emit(
                EventFactory::provider_error(&f.clock, correlation_id, "upstream gave up")
                    .with_metadata("user_id", serde_json::json!("user-42")),
            );
            f.clock.advance(Duration::from_secs(1));
        }

        assert_eq!(f.service.errors().len(), 1);
        let record = f
            .service
            .errors()
            .search(&ErrorFilter::default())
            .pop()
            .unwrap();
        assert_eq!(record.occurrence_count, 3);
        assert_eq!(record.affected_correlation_ids.len(), 3);
        assert!(record.affected_users.contains("user-42"));
        assert!(record.affected_services.contains("gateway"));
        assert_eq!(record.category, ErrorCategory::Timeout);
        assert_eq!(record.severity, ErrorSeverity::High);
        assert!(record.last_occurrence > record.first_occurrence);

        let mut tracked = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let MonitoringEvent::ErrorTracked(t) = event {
                tracked.push(t);
            }
        }
        assert_eq!(tracked.len(), 3);
        assert!(tracked[0].is_new);
        assert!(tracked[1..].iter().all(|t| !t.is_new && t.id == record.id));
    }

    #[tokio::test]
    async fn test_distinct_stacks_split_records() {
        let f = ServiceFixture::new().await;
        f.service
            .emit(EventFactory::provider_error(&f.clock, "c-1", "upstream gave up"));
        let mut other = EventFactory::provider_error(&f.clock, "c-2", "upstream gave up");
        if let Some(error) = other.error.as_mut() {
            error.stack = Some("at retry (retry.rs:12)".to_string());
        }
        f.service.emit(other);

        assert_eq!(f.service.errors().len(), 2);
        assert_eq!(f.service.errors().analytics().total_occurrences, 2);
    }

    #[tokio::test]
    async fn test_resolution_and_recurrence() {
        let f = ServiceFixture::new().await;
        f.service
            .emit(EventFactory::provider_error(&f.clock, "c-1", "upstream gave up"));
        let first = f.service.errors().search(&ErrorFilter::default()).pop().unwrap();

        assert_eq!(
            assert_ok!(f.service.errors().resolve(&first.id, "raised timeout", "oncall")),
            ResolveOutcome::Resolved
        );
        assert_eq!(
            assert_ok!(f.service.errors().resolve(&first.id, "again", "oncall")),
            ResolveOutcome::AlreadyResolved
        );

        f.clock.advance(Duration::from_secs(60));
        f.service
            .emit(EventFactory::provider_error(&f.clock, "c-2", "upstream gave up"));

        assert_eq!(f.service.errors().len(), 2);
        let reopened = f
            .service
            .errors()
            .get_by_fingerprint(&first.fingerprint)
            .unwrap();
        assert_ne!(reopened.id, first.id);
        assert_eq!(reopened.status, ErrorStatus::Open);
        assert_eq!(
            f.service.errors().get(&first.id).unwrap().status,
            ErrorStatus::Resolved
        );

        let analytics = f.service.errors().analytics();
        assert_eq!(analytics.total_records, 2);
        assert_eq!(analytics.open_records, 1);
        assert_eq!(analytics.by_service["gateway"], 2);
        assert_eq!(analytics.top_patterns.len(), 2);
    }

    #[tokio::test]
    async fn test_retention_evicts_stale_records() {
        let f = ServiceFixture::new().await;
        let retention = f.service.config().errors.retention_secs;

        f.service
            .emit(EventFactory::provider_error(&f.clock, "c-old", "upstream gave up"));
        let mut held = EventFactory::provider_error(&f.clock, "c-held", "quota exhausted");
        if let Some(error) = held.error.as_mut() {
            error.name = "QuotaError".to_string();
        }
        f.service.emit(held);
        let held_id = f
            .service
            .errors()
            .search(&ErrorFilter {
                text: Some("quota".to_string()),
                ..ErrorFilter::default()
            })
            .pop()
            .unwrap()
            .id;
        assert_ok!(f.service.errors().set_hold(&held_id, true));

        f.clock.advance(Duration::from_secs(retention + 1));
        let report = f.service.run_retention();
        assert_eq!(report.errors, 1);
        assert_eq!(f.service.errors().len(), 1);
        assert!(f.service.errors().get(&held_id).is_some());

        // the evicted fingerprint starts over
        let again = f
            .service
            .emit(EventFactory::provider_error(&f.clock, "c-new", "upstream gave up"));
        assert!(again.is_some());
        assert_eq!(f.service.errors().len(), 2);
        assert_eq!(f.service.errors().analytics().recurring, 0);
    }
}
