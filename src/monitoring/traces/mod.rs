//! Hierarchical execution traces
//!
//! Spans form a tree per pipeline execution. Closing a pipeline runs a
//! duration/resource bottleneck pass and an advisory parallelization check.

mod analysis;
mod builder;
mod types;

pub use builder::TraceTreeBuilder;
pub use types::{
    ParallelizationOpportunity, PipelineAnalysis, PipelineTrace, SpanBottleneck, SpanKind,
    SpanPerformance, SpanShare, SpanStatus, TraceSpan,
};
