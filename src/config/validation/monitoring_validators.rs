//! Validators for the pipeline configuration sections

use super::{Validate, validate_http_url};
use crate::config::models::*;
use std::collections::HashSet;
use tracing::{debug, warn};

impl Validate for EventLogConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating event log configuration");

        if self.flush_batch_size == 0 {
            return Err("Flush batch size must be greater than 0".to_string());
        }
        if self.flush_interval_secs == 0 {
            return Err("Flush interval must be greater than 0".to_string());
        }
        if self.history_size == 0 {
            return Err("Event history size must be greater than 0".to_string());
        }
        if self.max_line_bytes < 256 {
            return Err("Max line bytes must be at least 256".to_string());
        }
        if self.max_message_length == 0 || self.max_message_length >= self.max_line_bytes {
            return Err(format!(
                "Max message length must be between 1 and max line bytes ({})",
                self.max_line_bytes
            ));
        }
        if let Some(file) = &self.file {
            if file.directory.as_os_str().is_empty() {
                return Err("File sink directory cannot be empty".to_string());
            }
            if file.prefix.is_empty() || file.prefix.contains(['/', '\\']) {
                return Err(format!("Invalid file sink prefix: {:?}", file.prefix));
            }
        }
        if let Some(remote) = &self.remote {
            validate_http_url(&remote.url, "Remote sink")?;
            if remote.timeout_secs == 0 {
                return Err("Remote sink timeout must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}

impl Validate for CorrelationConfig {
    fn validate(&self) -> Result<(), String> {
        if self.idle_timeout_secs == 0 {
            return Err("Correlation idle timeout must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("Correlation sweep interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Validate for TraceConfig {
    fn validate(&self) -> Result<(), String> {
        if self.duration_warning_ms == 0 {
            return Err("Span duration warning threshold must be greater than 0".to_string());
        }
        if self.duration_error_ms <= self.duration_warning_ms {
            return Err(format!(
                "Span duration error threshold ({}ms) must exceed the warning threshold ({}ms)",
                self.duration_error_ms, self.duration_warning_ms
            ));
        }
        if !(self.memory_threshold_mb > 0.0) {
            return Err("Memory threshold must be positive".to_string());
        }
        if !(self.cpu_threshold_percent > 0.0 && self.cpu_threshold_percent <= 100.0) {
            return Err("CPU threshold must be within (0, 100]".to_string());
        }
        if self.history_size == 0 {
            return Err("Trace history size must be greater than 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.parallel_savings_percent) {
            return Err("Parallel savings percent must be within [0, 100]".to_string());
        }
        Ok(())
    }
}

impl Validate for ErrorTrackingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.stack_frames == 0 {
            return Err("Fingerprint stack frames must be greater than 0".to_string());
        }
        if self.retention_secs == 0 {
            return Err("Error retention must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("Error sweep interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Validate for ThresholdPair {
    fn validate(&self) -> Result<(), String> {
        if !self.warning.is_finite() || !self.critical.is_finite() {
            return Err("Thresholds must be finite".to_string());
        }
        if self.warning >= self.critical {
            return Err(format!(
                "Warning threshold ({}) must be below critical threshold ({})",
                self.warning, self.critical
            ));
        }
        Ok(())
    }
}

impl Validate for BottleneckThresholds {
    fn validate(&self) -> Result<(), String> {
        for (name, pair) in [
            ("cpu_percent", &self.cpu_percent),
            ("memory_percent", &self.memory_percent),
            ("response_time_ms", &self.response_time_ms),
            ("error_rate_percent", &self.error_rate_percent),
        ] {
            pair.validate().map_err(|e| format!("{}: {}", name, e))?;
        }
        Ok(())
    }
}

impl Validate for MetricsConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating metrics configuration");

        if self.max_samples == 0 {
            return Err("Max samples must be greater than 0".to_string());
        }
        if self.collection_interval_secs == 0 {
            return Err("Collection interval must be greater than 0".to_string());
        }
        if self.trend_min_samples < 2 {
            return Err("Trend analysis needs at least 2 samples".to_string());
        }
        if self.trend_window < self.trend_min_samples {
            return Err(format!(
                "Trend window ({}) must be at least the minimum sample count ({})",
                self.trend_window, self.trend_min_samples
            ));
        }
        if self.trend_window > self.max_samples {
            return Err("Trend window cannot exceed max samples".to_string());
        }
        if !(self.stable_threshold_percent >= 0.0) {
            return Err("Stable threshold must be non-negative".to_string());
        }
        if !(self.volatility_threshold > 0.0) {
            return Err("Volatility threshold must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.approach_ratio) {
            return Err("Approach ratio must be within [0, 1)".to_string());
        }
        self.thresholds.validate()
    }
}

impl Validate for ChannelConfig {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Channel name cannot be empty".to_string());
        }
        if self.settings.rate_limit_per_minute == Some(0) {
            return Err(format!(
                "Channel {} rate limit must be greater than 0",
                self.name
            ));
        }

        let context = format!("Channel {}", self.name);
        match &self.kind {
            ChannelKind::Console => Ok(()),
            ChannelKind::LogFile { path } => {
                if path.as_os_str().is_empty() {
                    Err(format!("{} log file path cannot be empty", context))
                } else {
                    Ok(())
                }
            }
            ChannelKind::Webhook { url, .. } => validate_http_url(url, &context),
            ChannelKind::Slack { webhook_url, .. } => validate_http_url(webhook_url, &context),
            ChannelKind::Email {
                relay_url,
                from,
                recipients,
            } => {
                validate_http_url(relay_url, &context)?;
                if !from.contains('@') {
                    return Err(format!("{} sender address is invalid: {}", context, from));
                }
                if recipients.is_empty() {
                    return Err(format!("{} needs at least one recipient", context));
                }
                if let Some(bad) = recipients.iter().find(|r| !r.contains('@')) {
                    return Err(format!("{} recipient address is invalid: {}", context, bad));
                }
                Ok(())
            }
        }
    }
}

impl Validate for AlertingConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating alerting configuration");

        for (name, secs) in [
            ("Evaluation interval", self.evaluation_interval_secs),
            ("Escalation check interval", self.escalation_check_interval_secs),
            ("Suppression sweep interval", self.suppression_sweep_interval_secs),
            ("Notification interval", self.notification_interval_secs),
        ] {
            if secs == 0 {
                return Err(format!("{} must be greater than 0", name));
            }
        }
        if self.history_size == 0 {
            return Err("Alert history size must be greater than 0".to_string());
        }

        let mut channel_names = HashSet::new();
        for channel in &self.channels {
            channel.validate()?;
            if !channel_names.insert(channel.name.as_str()) {
                return Err(format!("Duplicate channel name: {}", channel.name));
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(format!("Duplicate alert rule id: {}", rule.id));
            }
        }

        warn_unknown_channels(self, &channel_names);
        Ok(())
    }
}

/// Rules may name channels registered programmatically later, so this only warns
fn warn_unknown_channels(config: &AlertingConfig, known: &HashSet<&str>) {
    for rule in &config.rules {
        let escalation_channels = rule.escalation.iter().flat_map(|e| e.channels.iter());
        for channel in rule.channels.iter().chain(escalation_channels) {
            if !known.contains(channel.as_str()) {
                warn!(
                    rule = %rule.id,
                    channel = %channel,
                    "Alert rule references a channel that is not configured"
                );
            }
        }
    }
}
