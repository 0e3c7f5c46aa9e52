//! Configuration data models
//!
//! This module defines all configuration structures used by the pipeline.

#![allow(missing_docs)]

pub mod alerting;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod traces;

pub use alerting::*;
pub use errors::*;
pub use events::*;
pub use metrics::*;
pub use traces::*;

/// Default service name stamped on events
pub fn default_service_name() -> String {
    "pipeline-monitor".to_string()
}

/// Default capacity of the monitoring event bus
pub fn default_bus_capacity() -> usize {
    1024
}
