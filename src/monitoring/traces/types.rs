//! Trace span and pipeline types

use crate::monitoring::events::EventError;
use crate::monitoring::metrics::ResourceSample;
use crate::monitoring::types::Bottleneck;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Level of a span in the pipeline tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Pipeline,
    Stage,
    Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Started,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SpanStatus {
    /// Whether a span in this status has been closed
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SpanStatus::Completed | SpanStatus::Failed | SpanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpanStatus::Started => "started",
            SpanStatus::Running => "running",
            SpanStatus::Completed => "completed",
            SpanStatus::Failed => "failed",
            SpanStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Resource usage recorded when a span closes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanPerformance {
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub disk_percent: f64,
    pub network_bytes: u64,
}

impl From<&ResourceSample> for SpanPerformance {
    fn from(sample: &ResourceSample) -> Self {
        Self {
            memory_mb: sample.memory_used_mb(),
            cpu_percent: sample.cpu_percent,
            disk_percent: sample.disk_percent(),
            network_bytes: sample.network_bytes,
        }
    }
}

/// A timed unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    pub id: String,
    pub parent_id: Option<String>,
    pub correlation_id: String,
    pub name: String,
    pub kind: SpanKind,
    pub start_time: DateTime<Utc>,
    /// Set once the span reaches a terminal status
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub status: SpanStatus,
    pub performance: Option<SpanPerformance>,
    /// Child span ids in creation order
    pub children: Vec<String>,
    /// Spans this one had to wait for
    pub dependencies: Vec<String>,
    pub error: Option<EventError>,
}

impl TraceSpan {
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Share of the pipeline's duration spent in one span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanShare {
    pub span_id: String,
    pub name: String,
    pub duration_ms: u64,
    pub percent_of_total: f64,
}

/// A threshold crossed by a specific span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanBottleneck {
    pub span_id: String,
    pub span_name: String,
    pub bottleneck: Bottleneck,
}

/// Spans that could have run concurrently
///
/// `estimated_savings_percent` is a flat per-span credit, not a scheduling
/// simulation. Treat it as a hint only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelizationOpportunity {
    pub span_ids: Vec<String>,
    pub estimated_savings_percent: f64,
    pub advisory: bool,
}

/// Result of analysing a closed pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineAnalysis {
    pub total_duration_ms: u64,
    pub span_breakdown: Vec<SpanShare>,
    pub bottlenecks: Vec<SpanBottleneck>,
    pub parallelization: Option<ParallelizationOpportunity>,
}

/// All spans of one pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrace {
    pub correlation_id: String,
    pub root_span_id: String,
    pub name: String,
    pub status: SpanStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Spans in creation order
    pub spans: Vec<TraceSpan>,
    pub analysis: Option<PipelineAnalysis>,
}

impl PipelineTrace {
    pub fn span(&self, id: &str) -> Option<&TraceSpan> {
        self.spans.iter().find(|s| s.id == id)
    }
}
