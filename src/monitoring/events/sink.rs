//! Durable and remote destinations for flushed events
//!
//! The durable format is newline-delimited JSON, one [`Event`] per line.

use super::types::Event;
use crate::utils::error::{ObservabilityError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// An event already encoded as a single JSON line
#[derive(Debug, Clone)]
pub struct EncodedEvent {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Encode an event as one NDJSON line
///
/// Fails when serialization fails or the line exceeds `max_line_bytes`.
pub fn encode_event(event: &Event, max_line_bytes: usize) -> Result<EncodedEvent> {
    let line = serde_json::to_string(event)?;
    if line.len() > max_line_bytes {
        return Err(ObservabilityError::validation(format!(
            "encoded event is {} bytes, limit is {}",
            line.len(),
            max_line_bytes
        )));
    }
    Ok(EncodedEvent {
        timestamp: event.timestamp,
        line,
    })
}

/// Destination for flushed event batches
#[async_trait::async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Write a batch; either the whole batch is accepted or an error is returned
    async fn write_batch(&self, batch: &[EncodedEvent]) -> Result<()>;

    /// Sink name used in logs
    fn name(&self) -> &str;
}

/// Append-only NDJSON files, one per UTC day
///
/// Events land in `<directory>/<prefix>-YYYY-MM-DD.jsonl` according to their own timestamp.
#[derive(Debug, Clone)]
pub struct DailyFileSink {
    directory: PathBuf,
    prefix: String,
}

impl DailyFileSink {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding events for `day`
    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{}-{}.jsonl", self.prefix, day.format("%Y-%m-%d")))
    }
}

#[async_trait::async_trait]
impl EventSink for DailyFileSink {
    async fn write_batch(&self, batch: &[EncodedEvent]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            ObservabilityError::Sink(format!(
                "Failed to create log directory {:?}: {}",
                self.directory, e
            ))
        })?;

        let mut by_day: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for encoded in batch {
            let chunk = by_day.entry(encoded.timestamp.date_naive()).or_default();
            chunk.push_str(&encoded.line);
            chunk.push('\n');
        }

        for (day, chunk) in by_day {
            let path = self.path_for(day);
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| {
                    ObservabilityError::Sink(format!("Failed to open log file {:?}: {}", path, e))
                })?;

            file.write_all(chunk.as_bytes()).await.map_err(|e| {
                ObservabilityError::Sink(format!("Failed to write log file {:?}: {}", path, e))
            })?;
            file.flush().await?;
            debug!(path = ?path, "appended event batch");
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "daily_file"
    }
}

/// Delivers batches to a remote collector as an NDJSON POST body
#[derive(Debug, Clone)]
pub struct HttpSink {
    url: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl EventSink for HttpSink {
    async fn write_batch(&self, batch: &[EncodedEvent]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut body = String::with_capacity(batch.iter().map(|e| e.line.len() + 1).sum());
        for encoded in batch {
            body.push_str(&encoded.line);
            body.push('\n');
        }

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| ObservabilityError::Sink(format!("Failed to deliver events: {}", e)))?;

        if !response.status().is_success() {
            return Err(ObservabilityError::Sink(format!(
                "Event collector returned status: {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Writes to several sinks; fails if any of them fails
#[derive(Debug)]
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait::async_trait]
impl EventSink for FanoutSink {
    async fn write_batch(&self, batch: &[EncodedEvent]) -> Result<()> {
        let results =
            futures::future::join_all(self.sinks.iter().map(|s| s.write_batch(batch))).await;
        let failures: Vec<String> = results
            .into_iter()
            .zip(&self.sinks)
            .filter_map(|(r, s)| r.err().map(|e| format!("{}: {}", s.name(), e)))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ObservabilityError::Sink(failures.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
