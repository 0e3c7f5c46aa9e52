//! Test fixtures and data factories
//!
//! Provides factory methods for creating test data with sensible defaults.
//! All factories create real objects, not mocks.

use pipeline_monitor::ObservabilityConfig;
use pipeline_monitor::ObservabilityService;
use pipeline_monitor::config::FileSinkConfig;
use pipeline_monitor::monitoring::AlertSeverity;
use pipeline_monitor::monitoring::alerts::{AlertRule, ComparisonOperator, EscalationPolicy};
use pipeline_monitor::monitoring::events::Event;
use pipeline_monitor::monitoring::metrics::StaticSampler;
use pipeline_monitor::utils::time::{Clock, ManualClock};
use std::sync::Arc;
use tempfile::TempDir;

/// A service on a manual clock, writing events under a temporary directory
pub struct ServiceFixture {
    pub service: ObservabilityService,
    pub clock: Arc<ManualClock>,
    pub sampler: Arc<StaticSampler>,
    pub log_dir: TempDir,
}

impl ServiceFixture {
    /// Default configuration with a daily file sink
    pub async fn new() -> Self {
        Self::with_config(ObservabilityConfig::default()).await
    }

    /// `config` with its file sink pointed at a fresh temporary directory
    pub async fn with_config(mut config: ObservabilityConfig) -> Self {
        let log_dir = tempfile::tempdir().expect("temp dir");
        config.events.file = Some(FileSinkConfig {
            directory: log_dir.path().to_path_buf(),
            prefix: "events".to_string(),
        });

        let clock = Arc::new(ManualClock::starting_now());
        let sampler = Arc::new(StaticSampler::default());
        let service = ObservabilityService::with_clock(config, clock.clone(), sampler.clone())
            .await
            .expect("service");

        Self {
            service,
            clock,
            sampler,
            log_dir,
        }
    }

    /// Lines of today's event file
    pub fn log_lines(&self) -> Vec<String> {
        let path = self.log_dir.path().join(format!(
            "events-{}.jsonl",
            self.clock.now().date_naive().format("%Y-%m-%d")
        ));
        std::fs::read_to_string(path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Factory for producer events stamped with the fixture clock
pub struct EventFactory;

impl EventFactory {
    pub fn info(clock: &ManualClock, correlation_id: &str, message: &str) -> Event {
        Event::info("gateway", message)
            .with_timestamp(clock.now())
            .with_correlation(correlation_id)
    }

    pub fn provider_error(clock: &ManualClock, correlation_id: &str, message: &str) -> Event {
        Event::error("gateway", "provider call failed")
            .with_timestamp(clock.now())
            .with_correlation(correlation_id)
            .with_operation("chat_completion")
            .with_error(
                "ProviderTimeout",
                message,
                Some(
                    "at call_provider (router.rs:120)\n\
                     at route (router.rs:88)\n\
                     at handle (server.rs:40)"
                        .to_string(),
                ),
            )
    }
}

/// Factory for alert rules
pub struct RuleFactory;

impl RuleFactory {
    /// Fires when the average error rate exceeds 5%
    pub fn error_rate() -> AlertRule {
        AlertRule::new(
            "high-error-rate",
            "error_rate",
            ComparisonOperator::GreaterThan,
            5.0,
        )
        .with_severity(AlertSeverity::Warning)
        .with_tag("gateway")
    }

    /// `error_rate` escalating to `pager` after `delay_secs`
    pub fn escalating(delay_secs: u64) -> AlertRule {
        Self::error_rate().with_escalation(EscalationPolicy {
            delay_secs,
            channels: vec!["pager".to_string()],
            severity: AlertSeverity::Critical,
        })
    }
}
