//! Trace tree builder implementation

use super::analysis::analyze_pipeline;
use super::types::{PipelineTrace, SpanKind, SpanPerformance, SpanStatus, TraceSpan};
use crate::config::TraceConfig;
use crate::monitoring::bounded::BoundedPush;
use crate::monitoring::events::{
    Event, EventError, EventLevel, SPAN_END_TAG, SPAN_START_TAG, StructuredEventLog,
};
use crate::monitoring::metrics::ResourceSampler;
use crate::utils::error::{ObservabilityError, Result};
use crate::utils::{format_duration, generate_id};
use crate::utils::time::{Clock, elapsed_ms, has_elapsed};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const COMPONENT: &str = "trace_builder";

#[derive(Debug)]
struct ActivePipeline {
    root_span_id: String,
    name: String,
    started_at: DateTime<Utc>,
    /// Every span recorded under this correlation id, in creation order
    span_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct TraceState {
    spans: HashMap<String, TraceSpan>,
    /// Keyed by correlation id
    pipelines: HashMap<String, ActivePipeline>,
    /// Open span count per correlation id
    open_spans: HashMap<String, usize>,
}

impl TraceState {
    fn release_open(&mut self, correlation_id: &str) {
        if let Some(count) = self.open_spans.get_mut(correlation_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.open_spans.remove(correlation_id);
            }
        }
    }

    fn close_span(
        &mut self,
        span_id: &str,
        status: SpanStatus,
        now: DateTime<Utc>,
        performance: Option<SpanPerformance>,
        error: Option<EventError>,
    ) -> Option<u64> {
        let span = self.spans.get_mut(span_id)?;
        if !span.is_open() {
            return None;
        }
        let end = now.max(span.start_time);
        let duration = elapsed_ms(span.start_time, end);
        span.end_time = Some(end);
        span.duration_ms = Some(duration);
        span.status = status;
        span.performance = performance;
        span.error = error;
        let correlation_id = span.correlation_id.clone();
        self.release_open(&correlation_id);
        Some(duration)
    }
}

/// Builds hierarchical execution traces from span start/end calls
///
/// A `pipeline` root span opens a [`PipelineTrace`] keyed by its correlation
/// id; [`close_pipeline`](Self::close_pipeline) analyses it and moves it into
/// bounded history.
#[derive(Debug)]
pub struct TraceTreeBuilder {
    config: TraceConfig,
    clock: Arc<dyn Clock>,
    sampler: Arc<dyn ResourceSampler>,
    events: Arc<StructuredEventLog>,
    state: Mutex<TraceState>,
    history: RwLock<VecDeque<PipelineTrace>>,
}

impl TraceTreeBuilder {
    pub fn new(
        config: TraceConfig,
        clock: Arc<dyn Clock>,
        sampler: Arc<dyn ResourceSampler>,
        events: Arc<StructuredEventLog>,
    ) -> Self {
        Self {
            config,
            clock,
            sampler,
            events,
            state: Mutex::new(TraceState::default()),
            history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Open a span
    ///
    /// The parent, when given, must already exist under the same correlation id.
    pub fn start_span(
        &self,
        correlation_id: &str,
        name: &str,
        kind: SpanKind,
        parent_id: Option<&str>,
    ) -> Result<String> {
        if correlation_id.is_empty() {
            return Err(ObservabilityError::validation("correlation id cannot be empty"));
        }
        if name.is_empty() {
            return Err(ObservabilityError::validation("span name cannot be empty"));
        }

        let now = self.clock.now();
        let span_id = generate_id();
        {
            let mut state = self.state.lock();

            if let Some(parent_id) = parent_id {
                let parent = state.spans.get_mut(parent_id).ok_or_else(|| {
                    ObservabilityError::not_found(format!("parent span {}", parent_id))
                })?;
                if parent.correlation_id != correlation_id {
                    return Err(ObservabilityError::validation(format!(
                        "parent span {} belongs to correlation {}",
                        parent_id, parent.correlation_id
                    )));
                }
                parent.children.push(span_id.clone());
            } else if kind == SpanKind::Pipeline {
                if state.pipelines.contains_key(correlation_id) {
                    return Err(ObservabilityError::validation(format!(
                        "pipeline already active for correlation {}",
                        correlation_id
                    )));
                }
                state.pipelines.insert(
                    correlation_id.to_string(),
                    ActivePipeline {
                        root_span_id: span_id.clone(),
                        name: name.to_string(),
                        started_at: now,
                        span_ids: Vec::new(),
                    },
                );
            }

            if let Some(pipeline) = state.pipelines.get_mut(correlation_id) {
                pipeline.span_ids.push(span_id.clone());
            }
            *state
                .open_spans
                .entry(correlation_id.to_string())
                .or_insert(0) += 1;
            state.spans.insert(
                span_id.clone(),
                TraceSpan {
                    id: span_id.clone(),
                    parent_id: parent_id.map(str::to_string),
                    correlation_id: correlation_id.to_string(),
                    name: name.to_string(),
                    kind,
                    start_time: now,
                    end_time: None,
                    duration_ms: None,
                    status: SpanStatus::Started,
                    performance: None,
                    children: Vec::new(),
                    dependencies: Vec::new(),
                    error: None,
                },
            );
        }

        self.events.emit(
            Event::new(EventLevel::Debug, COMPONENT, format!("span started: {}", name))
                .with_timestamp(now)
                .with_correlation(correlation_id)
                .with_operation(name)
                .with_tag(SPAN_START_TAG)
                .with_metadata("span_id", span_id.clone().into()),
        );
        Ok(span_id)
    }

    /// Move a span from `started` to `running`
    pub fn mark_running(&self, span_id: &str) -> Result<()> {
        let (correlation_id, status) = {
            let mut state = self.state.lock();
            let span = state
                .spans
                .get_mut(span_id)
                .ok_or_else(|| ObservabilityError::not_found(format!("span {}", span_id)))?;
            if span.is_open() {
                span.status = SpanStatus::Running;
                return Ok(());
            }
            (span.correlation_id.clone(), span.status)
        };

        self.events.warn(
            COMPONENT,
            "mark_running",
            format!("span {} is already {}", span_id, status),
            Some(&correlation_id),
        );
        Err(ObservabilityError::SpanAlreadyClosed(span_id.to_string()))
    }

    /// Record that `span_id` waited for `depends_on`
    pub fn add_dependency(&self, span_id: &str, depends_on: &str) -> Result<()> {
        if span_id == depends_on {
            return Err(ObservabilityError::validation("a span cannot depend on itself"));
        }
        let mut state = self.state.lock();
        let dependency_correlation = state
            .spans
            .get(depends_on)
            .map(|s| s.correlation_id.clone())
            .ok_or_else(|| ObservabilityError::not_found(format!("span {}", depends_on)))?;
        let span = state
            .spans
            .get_mut(span_id)
            .ok_or_else(|| ObservabilityError::not_found(format!("span {}", span_id)))?;
        if span.correlation_id != dependency_correlation {
            return Err(ObservabilityError::validation(
                "dependencies must share a correlation id",
            ));
        }
        if !span.dependencies.iter().any(|d| d == depends_on) {
            span.dependencies.push(depends_on.to_string());
        }
        Ok(())
    }

    /// Close a span with a terminal status and return its duration in milliseconds
    ///
    /// Closing an already closed span changes nothing, emits a warning event
    /// and returns [`ObservabilityError::SpanAlreadyClosed`].
    pub fn end_span(
        &self,
        span_id: &str,
        status: SpanStatus,
        error: Option<EventError>,
    ) -> Result<u64> {
        if !status.is_terminal() {
            return Err(ObservabilityError::validation(format!(
                "span can only end as completed, failed or cancelled, not {}",
                status
            )));
        }

        let performance = self.sample_performance();
        let now = self.clock.now();

        let (closed, span) = {
            let mut state = self.state.lock();
            let closed = state.close_span(span_id, status, now, performance, error);
            let span = state.spans.get(span_id).cloned();
            (closed, span)
        };

        let Some(span) = span else {
            return Err(ObservabilityError::not_found(format!("span {}", span_id)));
        };

        match closed {
            Some(duration) => {
                self.events.emit(
                    Event::new(
                        EventLevel::Debug,
                        COMPONENT,
                        format!("span {}: {}", status, span.name),
                    )
                    .with_timestamp(now)
                    .with_correlation(&span.correlation_id)
                    .with_operation(&span.name)
                    .with_tag(SPAN_END_TAG)
                    .with_metadata("span_id", span_id.into())
                    .with_metadata("duration_ms", duration.into()),
                );
                Ok(duration)
            }
            None => {
                self.events.warn(
                    COMPONENT,
                    "end_span",
                    format!("span {} was already closed as {}", span_id, span.status),
                    Some(&span.correlation_id),
                );
                Err(ObservabilityError::SpanAlreadyClosed(span_id.to_string()))
            }
        }
    }

    fn sample_performance(&self) -> Option<SpanPerformance> {
        match self.sampler.sample() {
            Ok(sample) => Some(SpanPerformance::from(&sample)),
            Err(e) => {
                debug!("Resource sample unavailable at span close: {}", e);
                None
            }
        }
    }

    /// Finalize a pipeline trace
    ///
    /// Open spans other than the root are cancelled, the root takes `status`,
    /// and the analysed trace moves into history.
    pub fn close_pipeline(
        &self,
        correlation_id: &str,
        status: SpanStatus,
    ) -> Result<PipelineTrace> {
        if !status.is_terminal() {
            return Err(ObservabilityError::validation(format!(
                "pipeline can only close as completed, failed or cancelled, not {}",
                status
            )));
        }

        let performance = self.sample_performance();
        let now = self.clock.now();

        let (pipeline, spans, cancelled) = {
            let mut state = self.state.lock();
            let pipeline = state.pipelines.remove(correlation_id).ok_or_else(|| {
                ObservabilityError::not_found(format!("active pipeline {}", correlation_id))
            })?;

            let mut cancelled = 0;
            for span_id in &pipeline.span_ids {
                let span_status = if *span_id == pipeline.root_span_id {
                    status
                } else {
                    SpanStatus::Cancelled
                };
                if state
                    .close_span(span_id, span_status, now, performance, None)
                    .is_some()
                    && span_status == SpanStatus::Cancelled
                {
                    cancelled += 1;
                }
            }

            let spans: Vec<TraceSpan> = pipeline
                .span_ids
                .iter()
                .filter_map(|id| state.spans.remove(id))
                .collect();
            (pipeline, spans, cancelled)
        };

        let ended_at = now.max(pipeline.started_at);
        let total_ms = spans
            .iter()
            .find(|s| s.id == pipeline.root_span_id)
            .and_then(|s| s.duration_ms)
            .unwrap_or_else(|| elapsed_ms(pipeline.started_at, ended_at));
        let analysis = analyze_pipeline(&spans, total_ms, &self.config);

        let trace = PipelineTrace {
            correlation_id: correlation_id.to_string(),
            root_span_id: pipeline.root_span_id,
            name: pipeline.name,
            status,
            started_at: pipeline.started_at,
            ended_at: Some(ended_at),
            spans,
            analysis: Some(analysis),
        };

        self.history
            .write()
            .push_bounded(trace.clone(), self.config.history_size);

        let mut event = Event::info(
            COMPONENT,
            format!("pipeline {} {} in {}", trace.name, status, format_duration(total_ms)),
        )
        .with_timestamp(now)
        .with_correlation(correlation_id)
        .with_operation("close_pipeline")
        .with_metadata("spans", trace.spans.len().into());
        if cancelled > 0 {
            event = event.with_metadata("cancelled_spans", cancelled.into());
        }
        self.events.emit(event);

        Ok(trace)
    }

    pub fn get_span(&self, span_id: &str) -> Option<TraceSpan> {
        if let Some(span) = self.state.lock().spans.get(span_id) {
            return Some(span.clone());
        }
        self.history
            .read()
            .iter()
            .rev()
            .find_map(|t| t.span(span_id).cloned())
    }

    /// Whether any span of the correlation id is still open
    pub fn has_open_spans(&self, correlation_id: &str) -> bool {
        self.state.lock().open_spans.contains_key(correlation_id)
    }

    /// Snapshots of pipelines that have not been closed
    pub fn active_pipelines(&self) -> Vec<PipelineTrace> {
        let state = self.state.lock();
        let mut pipelines: Vec<PipelineTrace> = state
            .pipelines
            .iter()
            .map(|(correlation_id, p)| snapshot(correlation_id, p, &state.spans))
            .collect();
        pipelines.sort_by_key(|p| p.started_at);
        pipelines
    }

    /// The active pipeline for a correlation id, else the most recent closed one
    pub fn get_pipeline(&self, correlation_id: &str) -> Option<PipelineTrace> {
        {
            let state = self.state.lock();
            if let Some(p) = state.pipelines.get(correlation_id) {
                return Some(snapshot(correlation_id, p, &state.spans));
            }
        }
        self.history
            .read()
            .iter()
            .rev()
            .find(|t| t.correlation_id == correlation_id)
            .cloned()
    }

    /// Closed pipelines, most recent first
    pub fn history(&self, limit: Option<usize>) -> Vec<PipelineTrace> {
        let history = self.history.read();
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Drop closed spans that belong to no active pipeline and ended before `older_than`
    pub fn prune_orphans(&self, older_than: Duration) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let TraceState {
            spans, pipelines, ..
        } = &mut *state;
        let before = spans.len();
        spans.retain(|_, span| {
            pipelines.contains_key(&span.correlation_id)
                || span
                    .end_time
                    .is_none_or(|end| !has_elapsed(end, now, older_than))
        });
        before - spans.len()
    }

    pub fn clear(&self) {
        *self.state.lock() = TraceState::default();
        self.history.write().clear();
    }
}

fn snapshot(
    correlation_id: &str,
    pipeline: &ActivePipeline,
    spans: &HashMap<String, TraceSpan>,
) -> PipelineTrace {
    PipelineTrace {
        correlation_id: correlation_id.to_string(),
        root_span_id: pipeline.root_span_id.clone(),
        name: pipeline.name.clone(),
        status: spans
            .get(&pipeline.root_span_id)
            .map_or(SpanStatus::Started, |s| s.status),
        started_at: pipeline.started_at,
        ended_at: None,
        spans: pipeline
            .span_ids
            .iter()
            .filter_map(|id| spans.get(id).cloned())
            .collect(),
        analysis: None,
    }
}
