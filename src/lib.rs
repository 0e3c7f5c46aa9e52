//! # pipeline-monitor
//!
//! Observability and alerting pipeline for LLM gateways.
//!
//! ## Features
//!
//! - **Correlated events**: leveled, tagged events buffered and flushed to
//!   daily NDJSON files or a remote collector
//! - **Execution traces**: span trees per pipeline run with bottleneck and
//!   parallelization analysis
//! - **Error fingerprinting**: occurrences deduplicated by name, message and
//!   leading stack frames, classified once
//! - **Metrics**: bounded time series with threshold bottlenecks and trends
//! - **Alerting**: rule evaluation, acknowledgement, suppression, one-step
//!   escalation and fan-out to console, file, webhook, chat and mail channels
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeline_monitor::{ObservabilityConfig, ObservabilityService};
//! use pipeline_monitor::monitoring::events::Event;
//! use pipeline_monitor::monitoring::metrics::StaticSampler;
//! use pipeline_monitor::monitoring::traces::{SpanKind, SpanStatus};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ObservabilityService::new(
//!         ObservabilityConfig::default(),
//!         Arc::new(StaticSampler::default()),
//!     )
//!     .await?;
//!     service.start()?;
//!
//!     let correlation_id = service.new_correlation(Default::default());
//!     let root = service.start_span(&correlation_id, "chat-completion", SpanKind::Pipeline, None)?;
//!     service.emit(Event::info("gateway", "routing request").with_correlation(&correlation_id));
//!     service.end_span(&root, SpanStatus::Completed, None)?;
//!     let trace = service.close_pipeline(&correlation_id, SpanStatus::Completed)?;
//!     println!("{} spans", trace.spans.len());
//!
//!     service.stop().await?;
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod monitoring;
pub mod utils;

// Re-export main types
pub use config::ObservabilityConfig;
pub use monitoring::{EventBus, MonitoringEvent, ObservabilityService};
pub use utils::error::{ErrorKind, ObservabilityError, Result};

// Version information
/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
/// Description of the crate
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build metadata stamped by the build script
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub rust_version: &'static str,
    /// Unix seconds
    pub build_time: &'static str,
}

/// Metadata of the running build
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION,
        git_hash: env!("GIT_HASH"),
        rust_version: env!("RUST_VERSION"),
        build_time: env!("BUILD_TIME"),
    }
}
