//! Notification channel implementations

use super::types::Alert;
use crate::config::{ChannelConfig, ChannelKind};
use crate::monitoring::types::AlertSeverity;
use crate::utils::error::{ObservabilityError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification channel trait
///
/// Implement this to add a new notification sink; register it with the
/// [`NotificationDispatcher`](super::NotificationDispatcher).
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync + std::fmt::Debug {
    /// Deliver one alert
    async fn send(&self, alert: &Alert) -> Result<()>;

    /// Name rules refer to
    fn name(&self) -> &str;
}

/// Shared HTTP client for the HTTP-backed channels
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// Build the channel a config entry describes
pub fn build_channel(
    config: &ChannelConfig,
    client: &reqwest::Client,
) -> Arc<dyn NotificationChannel> {
    let name = config.name.clone();
    match &config.kind {
        ChannelKind::Console => Arc::new(ConsoleChannel::new(name)),
        ChannelKind::LogFile { path } => Arc::new(LogFileChannel::new(name, path.clone())),
        ChannelKind::Webhook { url, headers } => Arc::new(WebhookChannel::new(
            name,
            url.clone(),
            headers.clone(),
            client.clone(),
        )),
        ChannelKind::Slack {
            webhook_url,
            channel,
            username,
        } => Arc::new(SlackChannel::new(
            name,
            webhook_url.clone(),
            channel.clone(),
            username.clone(),
            client.clone(),
        )),
        ChannelKind::Email {
            relay_url,
            from,
            recipients,
        } => Arc::new(EmailChannel::new(
            name,
            relay_url.clone(),
            from.clone(),
            recipients.clone(),
            client.clone(),
        )),
    }
}

async fn ensure_success(response: reqwest::Response, target: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ObservabilityError::Notification(format!(
        "{} returned status {}: {}",
        target,
        status,
        crate::utils::truncate_string(&body, 256)
    )))
}

/// Writes alerts to the process log
#[derive(Debug)]
pub struct ConsoleChannel {
    name: String,
}

impl ConsoleChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for ConsoleChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Info => info!(alert_id = %alert.id, "{}", alert.summary()),
            AlertSeverity::Warning => warn!(alert_id = %alert.id, "{}", alert.summary()),
            AlertSeverity::Critical | AlertSeverity::Emergency => {
                error!(alert_id = %alert.id, "{}", alert.summary())
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Appends one JSON line per alert to a file
#[derive(Debug)]
pub struct LogFileChannel {
    name: String,
    path: PathBuf,
}

impl LogFileChannel {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for LogFileChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_vec(&serde_json::json!({
            "notified_at": chrono::Utc::now(),
            "alert": alert,
        }))?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Posts the alert as JSON to an arbitrary endpoint
#[derive(Debug)]
pub struct WebhookChannel {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            headers,
            client,
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::json!({
            "event": "alert",
            "status": alert.status,
            "alert": alert,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            ObservabilityError::Notification(format!("Failed to call webhook {}: {}", self.name, e))
        })?;
        ensure_success(response, &format!("webhook {}", self.name)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Slack notification channel
#[derive(Debug)]
pub struct SlackChannel {
    name: String,
    webhook_url: String,
    channel: Option<String>,
    username: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack notification channel
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        channel: Option<String>,
        username: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            channel,
            username,
            client,
        }
    }

    fn payload(&self, alert: &Alert) -> serde_json::Value {
        let color = match alert.severity {
            AlertSeverity::Info => "#36a64f",
            AlertSeverity::Warning => "#ff9500",
            AlertSeverity::Critical => "#ff0000",
            AlertSeverity::Emergency => "#8b0000",
        };

        serde_json::json!({
            "username": self.username.as_deref().unwrap_or("Pipeline Monitor"),
            "channel": self.channel,
            "attachments": [{
                "color": color,
                "title": format!("{} is {}", alert.rule_name, alert.status),
                "text": alert.summary(),
                "fields": [
                    {
                        "title": "Severity",
                        "value": alert.severity.to_string(),
                        "short": true
                    },
                    {
                        "title": "Value",
                        "value": format!("{} (threshold {})", alert.value, alert.threshold),
                        "short": true
                    },
                    {
                        "title": "Escalation",
                        "value": alert.escalation_level,
                        "short": true
                    },
                    {
                        "title": "Since",
                        "value": alert.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                        "short": true
                    }
                ],
                "footer": "pipeline-monitor",
                "ts": alert.updated_at.timestamp()
            }]
        })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for SlackChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&self.payload(alert))
            .send()
            .await
            .map_err(|e| {
                ObservabilityError::Notification(format!(
                    "Failed to send Slack notification: {}",
                    e
                ))
            })?;
        ensure_success(response, "Slack webhook").await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sends mail through an HTTP mail relay
#[derive(Debug)]
pub struct EmailChannel {
    name: String,
    relay_url: String,
    from: String,
    recipients: Vec<String>,
    client: reqwest::Client,
}

impl EmailChannel {
    pub fn new(
        name: impl Into<String>,
        relay_url: impl Into<String>,
        from: impl Into<String>,
        recipients: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            relay_url: relay_url.into(),
            from: from.into(),
            recipients,
            client,
        }
    }

    fn subject(alert: &Alert) -> String {
        format!(
            "[{}] {} is {}",
            alert.severity, alert.rule_name, alert.status
        )
    }
}

#[async_trait::async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, alert: &Alert) -> Result<()> {
        if self.recipients.is_empty() {
            return Err(ObservabilityError::Notification(format!(
                "email channel {} has no recipients",
                self.name
            )));
        }

        let message = serde_json::json!({
            "from": self.from,
            "to": self.recipients,
            "subject": Self::subject(alert),
            "text": alert.summary(),
        });

        let response = self
            .client
            .post(&self.relay_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                ObservabilityError::Notification(format!("Failed to reach mail relay: {}", e))
            })?;
        ensure_success(response, "mail relay").await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::AlertStatus;
    use chrono::Utc;

    fn create_test_alert(severity: AlertSeverity) -> Alert {
        let now = Utc::now();
        Alert {
            id: "alert-1".to_string(),
            rule_id: "error-rate".to_string(),
            rule_name: "High error rate".to_string(),
            metric: "error_rate".to_string(),
            status: AlertStatus::Firing,
            severity,
            value: 7.0,
            threshold: 5.0,
            tags: Default::default(),
            created_at: now,
            updated_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            suppression_expiry: None,
            suppression_reason: None,
            escalation_level: 0,
        }
    }

    // ==================== Console Tests ====================

    #[tokio::test]
    async fn test_console_channel_send() {
        let channel = ConsoleChannel::new("console");
        assert_eq!(channel.name(), "console");
        for severity in [AlertSeverity::Info, AlertSeverity::Emergency] {
            assert!(channel.send(&create_test_alert(severity)).await.is_ok());
        }
    }

    // ==================== Log File Tests ====================

    #[tokio::test]
    async fn test_log_file_channel_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alerts.jsonl");
        let channel = LogFileChannel::new("audit", &path);

        channel
            .send(&create_test_alert(AlertSeverity::Warning))
            .await
            .unwrap();
        channel
            .send(&create_test_alert(AlertSeverity::Critical))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["alert"]["severity"], "critical");
        assert_eq!(second["alert"]["rule_id"], "error-rate");
    }

    // ==================== Slack Tests ====================

    #[test]
    fn test_slack_payload() {
        let channel = SlackChannel::new(
            "slack",
            "https://hooks.slack.com/services/xxx",
            Some("#alerts".to_string()),
            None,
            reqwest::Client::new(),
        );
        let payload = channel.payload(&create_test_alert(AlertSeverity::Critical));

        assert_eq!(payload["channel"], "#alerts");
        assert_eq!(payload["username"], "Pipeline Monitor");
        assert_eq!(payload["attachments"][0]["color"], "#ff0000");
        assert_eq!(
            payload["attachments"][0]["title"],
            "High error rate is firing"
        );
    }

    // ==================== Email Tests ====================

    #[test]
    fn test_email_subject() {
        let alert = create_test_alert(AlertSeverity::Emergency);
        assert_eq!(
            EmailChannel::subject(&alert),
            "[EMERGENCY] High error rate is firing"
        );
    }

    #[tokio::test]
    async fn test_email_without_recipients_fails() {
        let channel = EmailChannel::new(
            "email",
            "http://127.0.0.1:9/send",
            "alerts@example.com",
            vec![],
            reqwest::Client::new(),
        );
        let err = channel
            .send(&create_test_alert(AlertSeverity::Info))
            .await
            .unwrap_err();
        assert!(matches!(err, ObservabilityError::Notification(_)));
    }

    // ==================== Factory Tests ====================

    #[test]
    fn test_build_channel_uses_config_name() {
        let client = reqwest::Client::new();
        let configs = [
            ChannelKind::Console,
            ChannelKind::LogFile {
                path: PathBuf::from("alerts.jsonl"),
            },
            ChannelKind::Webhook {
                url: "https://example.com/hook".to_string(),
                headers: HashMap::new(),
            },
        ];
        for (i, kind) in configs.into_iter().enumerate() {
            let config = ChannelConfig {
                name: format!("channel-{}", i),
                kind,
                settings: Default::default(),
            };
            let channel = build_channel(&config, &client);
            assert_eq!(channel.name(), format!("channel-{}", i));
        }
    }
}
