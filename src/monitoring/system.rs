//! The observability service façade

use crate::config::{EventLogConfig, ObservabilityConfig};
use crate::utils::error::{ObservabilityError, Result};
use crate::utils::time::{Clock, SystemClock};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::alerts::{AlertManager, NotificationDispatcher, build_channel, http_client};
use super::background::TaskScheduler;
use super::bus::{EventBus, MonitoringEvent};
use super::correlation::CorrelationTracker;
use super::errors::{ErrorContext, ErrorFingerprintIndex, TrackedError};
use super::events::{
    DailyFileSink, Event, EventError, EventLevel, EventSink, FanoutSink, HttpSink,
    StructuredEventLog,
};
use super::metrics::{MetricKind, MetricsStore, ResourceSampler};
use super::traces::{PipelineTrace, SpanKind, SpanStatus, TraceTreeBuilder};
use super::types::Bottleneck;

const FLUSH_TASK: &str = "event_flush";
const METRICS_TASK: &str = "metrics_collection";
const RULES_TASK: &str = "rule_evaluation";
const ESCALATION_TASK: &str = "escalation_check";
const SUPPRESSION_TASK: &str = "suppression_sweep";
const NOTIFICATION_TASK: &str = "notification_processing";
const CORRELATION_TASK: &str = "correlation_sweep";
const ERROR_RETENTION_TASK: &str = "error_retention";

const ALERT_TASKS: [&str; 4] = [RULES_TASK, ESCALATION_TASK, SUPPRESSION_TASK, NOTIFICATION_TASK];

/// What one retention pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub correlations: usize,
    pub spans: usize,
    pub errors: usize,
}

/// Wires every pipeline component to one clock, one event log and one bus
///
/// Producers call the recording methods (`emit`, `start_span`, `track_error`,
/// `record_metric`, ...). `start` launches the periodic tasks, `stop` cancels
/// them and flushes once more while keeping all state, and `destroy` also
/// drops the state.
#[derive(Debug, Clone)]
pub struct ObservabilityService {
    config: Arc<RwLock<ObservabilityConfig>>,
    clock: Arc<dyn Clock>,
    correlation: Arc<CorrelationTracker>,
    events: Arc<StructuredEventLog>,
    traces: Arc<TraceTreeBuilder>,
    errors: Arc<ErrorFingerprintIndex>,
    metrics: Arc<MetricsStore>,
    alerts: AlertManager,
    bus: EventBus,
    scheduler: Arc<TaskScheduler>,
    running: Arc<AtomicBool>,
}

impl ObservabilityService {
    /// Create a service on the system clock
    pub async fn new(
        config: ObservabilityConfig,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock), sampler).await
    }

    /// Create a service on an explicit clock
    pub async fn with_clock(
        config: ObservabilityConfig,
        clock: Arc<dyn Clock>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Result<Self> {
        info!(service = %config.service_name, "Initializing observability service");
        config.validate()?;

        let sink = build_sink(&config.events)?;
        let events = Arc::new(StructuredEventLog::new(
            config.events.clone(),
            clock.clone(),
            sink,
        ));
        let correlation = Arc::new(CorrelationTracker::new(&config.correlation, clock.clone()));
        let traces = Arc::new(TraceTreeBuilder::new(
            config.traces.clone(),
            clock.clone(),
            sampler.clone(),
            events.clone(),
        ));
        let errors = Arc::new(ErrorFingerprintIndex::new(
            config.errors.clone(),
            clock.clone(),
            events.clone(),
        ));
        let metrics = Arc::new(MetricsStore::new(
            config.metrics.clone(),
            clock.clone(),
            sampler,
        ));

        let dispatcher = Arc::new(NotificationDispatcher::new(clock.clone()));
        if !config.alerting.channels.is_empty() {
            let client = http_client()?;
            for channel_config in &config.alerting.channels {
                let channel = build_channel(channel_config, &client);
                dispatcher
                    .register(channel, channel_config.settings.clone())
                    .await?;
            }
        }

        let bus = EventBus::new(config.bus_capacity);
        let alerts = AlertManager::new(
            &config.alerting,
            clock.clone(),
            events.clone(),
            metrics.clone(),
            dispatcher.clone(),
            bus.clone(),
        )?;

        for rule in alerts.rules() {
            for channel in &rule.channels {
                if !dispatcher.contains(channel).await {
                    warn!(
                        rule = %rule.id,
                        channel = %channel,
                        "Alert rule refers to an unregistered channel"
                    );
                }
            }
        }

        info!("Observability service initialized");
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            clock,
            correlation,
            events,
            traces,
            errors,
            metrics,
            alerts,
            bus,
            scheduler: Arc::new(TaskScheduler::new()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    // ==== Lifecycle ====

    /// Launch the periodic tasks
    ///
    /// Escalation timers of alerts that were firing when the service stopped
    /// are armed again. Starting a running service does nothing.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Observability service already running");
            return Ok(());
        }
        info!("Starting observability service");

        let config = self.config.read().clone();
        if let Err(e) = self.schedule_tasks(&config) {
            self.scheduler.cancel_all();
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }
        let rearmed = self.alerts.rearm_escalations();
        if rearmed > 0 {
            debug!(rearmed, "Re-armed escalation timers");
        }

        info!(tasks = self.scheduler.len(), "Observability service started");
        Ok(())
    }

    /// Cancel every task and timer, then flush the event buffer one last time
    ///
    /// A flush or dispatch cut short by the cancellation puts its batch back
    /// first, so the final flush sees every undelivered event. All state is
    /// kept; `start` resumes where the service left off.
    pub async fn stop(&self) -> Result<()> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let cancelled = self.scheduler.shutdown().await;
        self.alerts.cancel_timers();
        if was_running {
            info!(cancelled, "Stopping observability service");
        }

        let report = self.events.flush().await?;
        debug!(flushed = report.flushed, "Final event flush");
        Ok(())
    }

    /// Stop, then drop every event, trace, error, metric and alert
    pub async fn destroy(&self) -> Result<()> {
        let stopped = self.stop().await;

        self.events.clear();
        self.correlation.clear();
        self.traces.clear();
        self.errors.clear();
        self.metrics.clear();
        self.alerts.clear();

        info!("Observability service destroyed");
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replace the configuration and reschedule the periodic tasks
    ///
    /// New intervals and the alerting switch take effect immediately.
    /// Component thresholds and sinks keep the values they were built with.
    pub fn update_config(&self, config: ObservabilityConfig) -> Result<()> {
        config.validate()?;
        info!("Updating observability configuration");

        *self.config.write() = config.clone();
        if self.is_running() {
            self.schedule_tasks(&config)?;
        }
        Ok(())
    }

    pub fn config(&self) -> ObservabilityConfig {
        self.config.read().clone()
    }

    /// Names of the running background tasks
    pub fn scheduled_tasks(&self) -> Vec<String> {
        self.scheduler.task_names()
    }

    fn schedule_tasks(&self, config: &ObservabilityConfig) -> Result<()> {
        self.spawn_flush_task(Duration::from_secs(config.events.flush_interval_secs));

        let service = self.clone();
        self.scheduler.schedule(
            METRICS_TASK,
            Duration::from_secs(config.metrics.collection_interval_secs),
            move || {
                let service = service.clone();
                async move {
                    service.collect_metrics();
                }
            },
        )?;

        let service = self.clone();
        self.scheduler.schedule(
            CORRELATION_TASK,
            Duration::from_secs(config.correlation.sweep_interval_secs),
            move || {
                let service = service.clone();
                async move {
                    service.sweep_correlations();
                }
            },
        )?;

        let service = self.clone();
        self.scheduler.schedule(
            ERROR_RETENTION_TASK,
            Duration::from_secs(config.errors.sweep_interval_secs),
            move || {
                let service = service.clone();
                async move {
                    service.errors.evict_expired();
                }
            },
        )?;

        if config.alerting.enabled {
            self.schedule_alert_tasks(config)?;
        } else {
            for name in ALERT_TASKS {
                self.scheduler.cancel(name);
            }
        }
        Ok(())
    }

    fn schedule_alert_tasks(&self, config: &ObservabilityConfig) -> Result<()> {
        let alerting = &config.alerting;

        let alerts = self.alerts.clone();
        self.scheduler.schedule(
            RULES_TASK,
            Duration::from_secs(alerting.evaluation_interval_secs),
            move || {
                let alerts = alerts.clone();
                async move {
                    let changed = alerts.evaluate_rules();
                    if !changed.is_empty() {
                        debug!(changed = changed.len(), "Rule evaluation changed alerts");
                    }
                }
            },
        )?;

        let alerts = self.alerts.clone();
        self.scheduler.schedule(
            ESCALATION_TASK,
            Duration::from_secs(alerting.escalation_check_interval_secs),
            move || {
                let alerts = alerts.clone();
                async move {
                    alerts.check_escalation();
                }
            },
        )?;

        let alerts = self.alerts.clone();
        self.scheduler.schedule(
            SUPPRESSION_TASK,
            Duration::from_secs(alerting.suppression_sweep_interval_secs),
            move || {
                let alerts = alerts.clone();
                async move {
                    alerts.sweep_suppressions();
                }
            },
        )?;

        let alerts = self.alerts.clone();
        self.scheduler.schedule(
            NOTIFICATION_TASK,
            Duration::from_secs(alerting.notification_interval_secs),
            move || {
                let alerts = alerts.clone();
                async move {
                    alerts.process_pending().await;
                }
            },
        )
    }

    /// Flush on the interval, or early when the buffer fills up
    fn spawn_flush_task(&self, period: Duration) {
        let events = self.events.clone();
        self.scheduler.spawn(FLUSH_TASK, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = events.flush_signal().notified() => {}
                }
                // a failed batch stays buffered for the next pass
                if let Err(e) = events.flush().await {
                    warn!(error = %e, "Periodic event flush failed");
                }
            }
        });
    }

    // ==== Producer API ====

    /// Issue a new correlation id
    pub fn new_correlation(&self, origin: BTreeMap<String, serde_json::Value>) -> String {
        self.correlation.new_correlation(origin)
    }

    /// Record an event
    ///
    /// Events carrying an error at `error` level or above are also tracked in
    /// the error index. Failures past the event log are logged, never returned.
    pub fn emit(&self, event: Event) -> Option<String> {
        if let Some(correlation_id) = &event.correlation_id {
            self.correlation.touch(correlation_id);
        }

        let tracked = event
            .error
            .as_ref()
            .filter(|_| event.level >= EventLevel::Error)
            .map(|error| {
                let context = ErrorContext {
                    correlation_id: event.correlation_id.clone(),
                    user_id: event
                        .metadata
                        .get("user_id")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    service: Some(event.service.clone()),
                    operation: event.operation.clone(),
                };
                (error.clone(), context, event.metadata.clone())
            });

        let id = self.events.emit(event);

        if let Some((error, context, metadata)) = tracked {
            if let Err(e) = self.track_error(&error, context, metadata) {
                debug!(error = %e, "Event error was not tracked");
            }
        }
        id
    }

    /// Record an error occurrence directly
    pub fn track_error(
        &self,
        error: &EventError,
        context: ErrorContext,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<TrackedError> {
        let tracked = self.errors.track(error, context, metadata)?;
        self.bus.publish(MonitoringEvent::ErrorTracked(tracked.clone()));
        Ok(tracked)
    }

    pub fn start_span(
        &self,
        correlation_id: &str,
        name: &str,
        kind: SpanKind,
        parent_id: Option<&str>,
    ) -> Result<String> {
        self.correlation.touch(correlation_id);
        self.traces.start_span(correlation_id, name, kind, parent_id)
    }

    pub fn end_span(
        &self,
        span_id: &str,
        status: SpanStatus,
        error: Option<EventError>,
    ) -> Result<u64> {
        self.traces.end_span(span_id, status, error)
    }

    /// Close a pipeline trace and record its duration as a timer metric
    pub fn close_pipeline(&self, correlation_id: &str, status: SpanStatus) -> Result<PipelineTrace> {
        let trace = self.traces.close_pipeline(correlation_id, status)?;

        if let Some(ended_at) = trace.ended_at {
            let duration_ms = (ended_at - trace.started_at).num_milliseconds().max(0) as f64;
            let tags = BTreeMap::from([
                ("pipeline".to_string(), trace.name.clone()),
                ("status".to_string(), trace.status.to_string()),
            ]);
            if let Err(e) =
                self.metrics
                    .record("pipeline.duration_ms", MetricKind::Timer, duration_ms, "ms", tags)
            {
                debug!(error = %e, "Pipeline duration not recorded");
            }
        }

        self.bus
            .publish(MonitoringEvent::PipelineClosed(Box::new(trace.clone())));
        Ok(trace)
    }

    pub fn record_metric(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        unit: &str,
        tags: BTreeMap<String, String>,
    ) -> Result<()> {
        self.metrics.record(name, kind, value, unit, tags)
    }

    // ==== Periodic work ====

    /// Sample resources and publish every detected bottleneck
    pub fn collect_metrics(&self) -> Vec<Bottleneck> {
        if let Err(e) = self.metrics.collect_resources() {
            warn!(error = %e, "Resource sampling failed");
        }

        let bottlenecks = self.metrics.detect_bottlenecks();
        for bottleneck in &bottlenecks {
            self.bus
                .publish(MonitoringEvent::BottleneckDetected(bottleneck.clone()));
        }
        bottlenecks
    }

    /// Forget idle correlations and stale closed spans
    fn sweep_correlations(&self) -> (usize, usize) {
        let traces = self.traces.clone();
        let correlations = self
            .correlation
            .sweep(|correlation_id| traces.has_open_spans(correlation_id));
        let idle = Duration::from_secs(self.config.read().correlation.idle_timeout_secs);
        let spans = self.traces.prune_orphans(idle);
        if correlations + spans > 0 {
            debug!(correlations, spans, "Swept idle correlations");
        }
        (correlations, spans)
    }

    /// Run every retention sweep once
    pub fn run_retention(&self) -> RetentionReport {
        let (correlations, spans) = self.sweep_correlations();
        RetentionReport {
            correlations,
            spans,
            errors: self.errors.evict_expired(),
        }
    }

    // ==== Component access ====

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn correlation(&self) -> &CorrelationTracker {
        &self.correlation
    }

    pub fn events(&self) -> &StructuredEventLog {
        &self.events
    }

    pub fn traces(&self) -> &TraceTreeBuilder {
        &self.traces
    }

    pub fn errors(&self) -> &ErrorFingerprintIndex {
        &self.errors
    }

    pub fn metrics(&self) -> &MetricsStore {
        &self.metrics
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to alert, error, pipeline and bottleneck events
    pub fn subscribe(&self) -> broadcast::Receiver<MonitoringEvent> {
        self.bus.subscribe()
    }
}

fn build_sink(config: &EventLogConfig) -> Result<Option<Arc<dyn EventSink>>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
    if let Some(file) = &config.file {
        sinks.push(Arc::new(DailyFileSink::new(&file.directory, &file.prefix)));
    }
    if let Some(remote) = &config.remote {
        let sink = HttpSink::new(&remote.url, Duration::from_secs(remote.timeout_secs))
            .map_err(|e| ObservabilityError::Config(format!("remote event sink: {}", e)))?;
        sinks.push(Arc::new(sink));
    }

    Ok(match sinks.len() {
        0 => None,
        1 => sinks.pop(),
        _ => Some(Arc::new(FanoutSink::new(sinks))),
    })
}
