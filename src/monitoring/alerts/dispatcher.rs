//! Fan-out of alerts to notification channels

use super::channels::NotificationChannel;
use super::types::{Alert, ChannelSettings, NotificationResult};
use crate::utils::error::{ObservabilityError, Result};
use crate::utils::time::Clock;
use futures::future::join_all;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct RegisteredChannel {
    channel: Arc<dyn NotificationChannel>,
    settings: ChannelSettings,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for RegisteredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredChannel")
            .field("channel", &self.channel)
            .field("settings", &self.settings)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

/// Sends alerts to named channels
///
/// Every send runs in its own task, so an error or a panic inside one channel
/// never keeps the others from being called.
#[derive(Debug)]
pub struct NotificationDispatcher {
    channels: RwLock<HashMap<String, RegisteredChannel>>,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Register a channel under its own name, replacing any previous one
    pub async fn register(
        &self,
        channel: Arc<dyn NotificationChannel>,
        settings: ChannelSettings,
    ) -> Result<()> {
        let name = channel.name().to_string();
        if name.trim().is_empty() {
            return Err(ObservabilityError::validation("channel name cannot be empty"));
        }

        let limiter = match settings.rate_limit_per_minute {
            Some(per_minute) => {
                let per_minute = NonZeroU32::new(per_minute).ok_or_else(|| {
                    ObservabilityError::validation(format!(
                        "channel {} rate limit must be positive",
                        name
                    ))
                })?;
                Some(Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))))
            }
            None => None,
        };

        info!(channel = %name, "Registering notification channel");
        self.channels.write().await.insert(
            name,
            RegisteredChannel {
                channel,
                settings,
                limiter,
            },
        );
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> bool {
        self.channels.write().await.remove(name).is_some()
    }

    /// Registered channel names, sorted
    pub async fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.channels.read().await.contains_key(name)
    }

    /// Send `alert` to each named channel that accepts it
    ///
    /// Unknown, disabled, rate-limited and filtered-out channels are skipped
    /// silently. Returns one result per attempted channel.
    pub async fn dispatch(&self, alert: &Alert, channels: &[String]) -> Vec<NotificationResult> {
        let selected = self.select(alert, channels).await;
        if selected.is_empty() {
            debug!(alert_id = %alert.id, "No channel accepted alert");
            return Vec::new();
        }

        let sends = selected.into_iter().map(|channel| {
            let alert = alert.clone();
            let name = channel.name().to_string();
            let task = tokio::spawn(async move { channel.send(&alert).await });
            async move { (name, task.await) }
        });

        join_all(sends)
            .await
            .into_iter()
            .map(|(channel, outcome)| {
                let error = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(join_error) if join_error.is_panic() => {
                        Some("channel panicked while sending".to_string())
                    }
                    Err(join_error) => Some(join_error.to_string()),
                };
                match &error {
                    None => debug!(channel = %channel, alert_id = %alert.id, "Alert sent"),
                    Some(e) => warn!(
                        channel = %channel,
                        alert_id = %alert.id,
                        error = %e,
                        "Failed to send alert"
                    ),
                }
                NotificationResult {
                    channel,
                    success: error.is_none(),
                    timestamp: self.clock.now(),
                    error,
                }
            })
            .collect()
    }

    async fn select(
        &self,
        alert: &Alert,
        channels: &[String],
    ) -> Vec<Arc<dyn NotificationChannel>> {
        let registered = self.channels.read().await;
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for name in channels {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let Some(entry) = registered.get(name) else {
                debug!(channel = %name, "Skipping unknown channel");
                continue;
            };
            if !entry.settings.enabled || !entry.settings.matches(alert) {
                continue;
            }
            if let Some(limiter) = &entry.limiter {
                if limiter.check().is_err() {
                    debug!(channel = %name, alert_id = %alert.id, "Channel rate limited");
                    continue;
                }
            }
            selected.push(entry.channel.clone());
        }
        selected
    }
}
