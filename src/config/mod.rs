//! Configuration management for the pipeline
//!
//! This module handles loading, validation, and environment overrides of the
//! observability pipeline configuration.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::monitoring::events::EventLevel;
use crate::utils::error::{ObservabilityError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix of the environment variables read by [`ObservabilityConfig::from_env`]
pub const ENV_PREFIX: &str = "PIPELINE_MONITOR_";

/// Main configuration struct for the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name stamped on internally generated events
    pub service_name: String,
    pub events: EventLogConfig,
    pub correlation: CorrelationConfig,
    pub traces: TraceConfig,
    pub errors: ErrorTrackingConfig,
    pub metrics: MetricsConfig,
    pub alerting: AlertingConfig,
    /// Capacity of the monitoring event broadcast
    pub bus_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            events: EventLogConfig::default(),
            correlation: CorrelationConfig::default(),
            traces: TraceConfig::default(),
            errors: ErrorTrackingConfig::default(),
            metrics: MetricsConfig::default(),
            alerting: AlertingConfig::default(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ObservabilityError::Config(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_yaml(&content)?;
        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ObservabilityError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PIPELINE_MONITOR_*` environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");
        Self::default().with_env_overrides()
    }

    /// Apply `PIPELINE_MONITOR_*` environment variables on top of this configuration
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from `lookup`, keyed by the variable name without prefix
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(name) = lookup("SERVICE_NAME") {
            self.service_name = name;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.events.min_level = level
                .parse::<EventLevel>()
                .map_err(|e| ObservabilityError::Config(format!("LOG_LEVEL: {}", e)))?;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            let prefix = self
                .events
                .file
                .as_ref()
                .map(|f| f.prefix.clone())
                .unwrap_or_else(|| "events".to_string());
            self.events.file = Some(FileSinkConfig {
                directory: PathBuf::from(dir),
                prefix,
            });
        }
        if let Some(url) = lookup("REMOTE_URL") {
            let timeout_secs = self.events.remote.as_ref().map_or(10, |r| r.timeout_secs);
            self.events.remote = Some(RemoteSinkConfig { url, timeout_secs });
        }
        if let Some(echo) = lookup("CONSOLE_ECHO") {
            self.events.console_echo = parse_env("CONSOLE_ECHO", &echo)?;
        }
        if let Some(secs) = lookup("FLUSH_INTERVAL_SECS") {
            self.events.flush_interval_secs = parse_env("FLUSH_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("COLLECTION_INTERVAL_SECS") {
            self.metrics.collection_interval_secs = parse_env("COLLECTION_INTERVAL_SECS", &secs)?;
        }
        if let Some(enabled) = lookup("ALERTING_ENABLED") {
            self.alerting.enabled = parse_env("ALERTING_ENABLED", &enabled)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        debug!("Validating configuration");

        if self.service_name.trim().is_empty() {
            return Err(ObservabilityError::Config(
                "Service name cannot be empty".to_string(),
            ));
        }
        if self.bus_capacity == 0 {
            return Err(ObservabilityError::Config(
                "Bus capacity must be greater than 0".to_string(),
            ));
        }

        let sections: [(&str, &dyn Validate); 6] = [
            ("Event log", &self.events),
            ("Correlation", &self.correlation),
            ("Trace", &self.traces),
            ("Error tracking", &self.errors),
            ("Metrics", &self.metrics),
            ("Alerting", &self.alerting),
        ];
        for (name, section) in sections {
            section
                .validate()
                .map_err(|e| ObservabilityError::Config(format!("{} config error: {}", name, e)))?;
        }

        debug!("Configuration validation completed");
        Ok(())
    }

    /// Convert to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        ObservabilityError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, key, raw, e))
    })
}
