//! Typed broadcast of monitoring domain events
//!
//! Interested consumers (dashboards, exporters, tests) call
//! [`EventBus::subscribe`] and receive every event published after that point.
//! A slow subscriber that falls more than the bus capacity behind sees
//! `RecvError::Lagged` and skips ahead; publishers never block.

use crate::monitoring::alerts::Alert;
use crate::monitoring::errors::TrackedError;
use crate::monitoring::traces::PipelineTrace;
use crate::monitoring::types::Bottleneck;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Something observable happened inside the pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MonitoringEvent {
    AlertCreated(Alert),
    /// A firing alert received a new triggering value or came back from suppression
    AlertUpdated(Alert),
    AlertResolved(Alert),
    AlertAcknowledged(Alert),
    AlertSuppressed(Alert),
    AlertEscalated(Alert),
    ErrorTracked(TrackedError),
    PipelineClosed(Box<PipelineTrace>),
    BottleneckDetected(Bottleneck),
}

impl MonitoringEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitoringEvent::AlertCreated(_) => "alert_created",
            MonitoringEvent::AlertUpdated(_) => "alert_updated",
            MonitoringEvent::AlertResolved(_) => "alert_resolved",
            MonitoringEvent::AlertAcknowledged(_) => "alert_acknowledged",
            MonitoringEvent::AlertSuppressed(_) => "alert_suppressed",
            MonitoringEvent::AlertEscalated(_) => "alert_escalated",
            MonitoringEvent::ErrorTracked(_) => "error_tracked",
            MonitoringEvent::PipelineClosed(_) => "pipeline_closed",
            MonitoringEvent::BottleneckDetected(_) => "bottleneck_detected",
        }
    }
}

/// Bounded multi-consumer event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitoringEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers, returning how many received it
    pub fn publish(&self, event: MonitoringEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(event = name, "No subscribers for monitoring event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitoringEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::default_bus_capacity())
    }
}
