//! Notification channels that record what they were sent

use parking_lot::Mutex;
use pipeline_monitor::Result;
use pipeline_monitor::monitoring::alerts::{Alert, NotificationChannel};
use std::sync::Arc;

#[derive(Debug)]
pub struct RecordingChannel {
    name: String,
    received: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Alert> {
        self.received.lock().clone()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.received.lock().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
