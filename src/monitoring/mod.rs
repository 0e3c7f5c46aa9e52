//! Monitoring and observability pipeline
//!
//! Events, traces, errors and metrics flow in through [`ObservabilityService`];
//! alerts and domain events flow out through notification channels and the
//! [`EventBus`].

pub mod alerts;
pub mod correlation;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod traces;

mod background;
mod bounded;
mod bus;
mod system;
#[cfg(test)]
mod tests;
mod types;

pub use background::TaskScheduler;
pub use bus::{EventBus, MonitoringEvent};
pub use system::{ObservabilityService, RetentionReport};
pub use types::{AlertSeverity, Bottleneck, BottleneckSeverity};
