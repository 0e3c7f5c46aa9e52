//! Event log and correlation configuration

use crate::monitoring::events::EventLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured event log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Events below this level are dropped
    pub min_level: EventLevel,
    /// Buffer size that triggers an early flush
    pub flush_batch_size: usize,
    /// Periodic flush interval
    pub flush_interval_secs: u64,
    /// Echo accepted events through `tracing`
    pub console_echo: bool,
    /// Events retained in memory for queries
    pub history_size: usize,
    /// Encoded lines longer than this are treated as malformed
    pub max_line_bytes: usize,
    /// Messages are truncated to this many bytes
    pub max_message_length: usize,
    /// Daily rotated NDJSON files
    pub file: Option<FileSinkConfig>,
    /// Remote collector receiving each flushed batch
    pub remote: Option<RemoteSinkConfig>,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            min_level: EventLevel::Info,
            flush_batch_size: 100,
            flush_interval_secs: 5,
            console_echo: false,
            history_size: 10_000,
            max_line_bytes: 64 * 1024,
            max_message_length: 4096,
            file: None,
            remote: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSinkConfig {
    pub directory: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
}

fn default_file_prefix() -> String {
    "events".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSinkConfig {
    pub url: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_remote_timeout_secs() -> u64 {
    10
}

/// Correlation tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Contexts unseen for this long are swept
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}
