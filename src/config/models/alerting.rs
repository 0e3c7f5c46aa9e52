//! Alerting configuration

use crate::monitoring::alerts::{AlertRule, ChannelSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Alerting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Enable alerting
    pub enabled: bool,
    /// Periodic rule evaluation interval
    pub evaluation_interval_secs: u64,
    pub escalation_check_interval_secs: u64,
    pub suppression_sweep_interval_secs: u64,
    /// Interval at which queued notifications are dispatched
    pub notification_interval_secs: u64,
    /// Alerts kept after they resolve
    pub history_size: usize,
    pub rules: Vec<AlertRule>,
    pub channels: Vec<ChannelConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluation_interval_secs: 60,
            escalation_check_interval_secs: 30,
            suppression_sweep_interval_secs: 30,
            notification_interval_secs: 5,
            history_size: 1000,
            rules: Vec::new(),
            channels: Vec::new(),
        }
    }
}

/// One configured notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Name rules refer to
    pub name: String,
    #[serde(flatten)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub settings: ChannelSettings,
}

/// Concrete channel backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelKind {
    Console,
    LogFile {
        path: PathBuf,
    },
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Slack {
        webhook_url: String,
        #[serde(default)]
        channel: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
    Email {
        relay_url: String,
        from: String,
        recipients: Vec<String>,
    },
}

impl ChannelKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ChannelKind::Console => "console",
            ChannelKind::LogFile { .. } => "log_file",
            ChannelKind::Webhook { .. } => "webhook",
            ChannelKind::Slack { .. } => "slack",
            ChannelKind::Email { .. } => "email",
        }
    }
}
