//! Structured event log implementation

use super::query::EventQuery;
use super::sink::{EventSink, encode_event};
use super::types::{
    Event, EventLevel, EventLogStats, FlushReport, MALFORMED_TAG, MalformedEvent,
};
use crate::config::EventLogConfig;
use crate::monitoring::bounded::BoundedPush;
use crate::utils::error::Result;
use crate::utils::time::Clock;
use crate::utils::{generate_id, truncate_string};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct EventCounters {
    emitted: AtomicU64,
    dropped_below_level: AtomicU64,
    flushed: AtomicU64,
    malformed: AtomicU64,
    failed_flushes: AtomicU64,
}

/// Leveled, tagged, buffered event ingestion with batch flushes to a sink
///
/// `emit` only ever appends in memory. Durable writes happen in [`flush`](Self::flush),
/// which the background flush task calls on its interval or when the buffer fills.
#[derive(Debug)]
pub struct StructuredEventLog {
    config: EventLogConfig,
    clock: Arc<dyn Clock>,
    /// Events waiting for the next flush
    buffer: Mutex<Vec<Event>>,
    /// Retained events for queries, in emission order
    history: RwLock<VecDeque<Event>>,
    /// Events that could not be encoded
    malformed: Mutex<VecDeque<MalformedEvent>>,
    sink: Option<Arc<dyn EventSink>>,
    flush_signal: Notify,
    /// Serializes flushes so a failed batch is restored ahead of newer events
    flush_lock: tokio::sync::Mutex<()>,
    counters: EventCounters,
}

impl StructuredEventLog {
    /// Create a new event log
    pub fn new(
        config: EventLogConfig,
        clock: Arc<dyn Clock>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            config,
            clock,
            buffer: Mutex::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            malformed: Mutex::new(VecDeque::new()),
            sink,
            flush_signal: Notify::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            counters: EventCounters::default(),
        }
    }

    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    /// Append an event
    ///
    /// Returns the event id, or `None` when the event is below the minimum level.
    pub fn emit(&self, mut event: Event) -> Option<String> {
        if event.level < self.config.min_level {
            self.counters
                .dropped_below_level
                .fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if event.id.is_empty() {
            event.id = generate_id();
        }
        if event.message.len() > self.config.max_message_length {
            event.message = truncate_string(&event.message, self.config.max_message_length);
        }

        if self.config.console_echo {
            echo(&event);
        }

        let id = event.id.clone();
        let buffered = {
            let mut buffer = self.buffer.lock();
            self.history
                .write()
                .push_bounded(event.clone(), self.config.history_size);
            buffer.push(event);
            buffer.len()
        };

        self.counters.emitted.fetch_add(1, Ordering::Relaxed);

        if buffered >= self.config.flush_batch_size {
            self.flush_signal.notify_one();
        }

        Some(id)
    }

    /// Emit a warning on behalf of another pipeline component
    pub fn warn(
        &self,
        component: &str,
        operation: &str,
        message: impl Into<String>,
        correlation_id: Option<&str>,
    ) -> Option<String> {
        let mut event = Event::warn(component, message)
            .with_timestamp(self.clock.now())
            .with_operation(operation);
        if let Some(correlation_id) = correlation_id {
            event = event.with_correlation(correlation_id);
        }
        self.emit(event)
    }

    /// Write buffered events to the sink
    ///
    /// Events that fail to encode are set aside and do not abort the batch.
    /// On sink failure the batch is restored to the front of the buffer and
    /// the error is returned; it will be retried on the next flush.
    pub async fn flush(&self) -> Result<FlushReport> {
        let _flushing = self.flush_lock.lock().await;

        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();
        let mut encoded = Vec::with_capacity(batch.len());
        let mut pending = Vec::with_capacity(batch.len());

        for event in batch {
            match encode_event(&event, self.config.max_line_bytes) {
                Ok(line) => {
                    encoded.push(line);
                    pending.push(event);
                }
                Err(e) => {
                    report.malformed += 1;
                    self.set_aside(event, e.to_string());
                }
            }
        }

        let count = pending.len();
        // restores the batch if the write fails or this future is dropped mid-write
        let in_flight = InFlight {
            log: self,
            batch: Some(pending),
        };
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write_batch(&encoded).await {
                self.counters.failed_flushes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    sink = sink.name(),
                    events = count,
                    error = %e,
                    "Event flush failed, batch restored to buffer"
                );
                return Err(e);
            }
        }
        in_flight.delivered();

        report.flushed = count;
        self.counters
            .flushed
            .fetch_add(report.flushed as u64, Ordering::Relaxed);
        debug!(
            flushed = report.flushed,
            malformed = report.malformed,
            "Flushed event batch"
        );
        Ok(report)
    }

    fn restore(&self, mut batch: Vec<Event>) {
        let mut buffer = self.buffer.lock();
        batch.append(&mut buffer);
        *buffer = batch;
    }

    fn set_aside(&self, mut event: Event, reason: String) {
        event.tags.insert(MALFORMED_TAG.to_string());
        warn!(event_id = %event.id, reason = %reason, "Malformed event excluded from flush");
        self.counters.malformed.fetch_add(1, Ordering::Relaxed);
        self.malformed.lock().push_bounded(
            MalformedEvent {
                event,
                reason,
                detected_at: self.clock.now(),
            },
            self.config.history_size,
        );
    }

    /// Retained events matching `query`, in emission order
    ///
    /// With a limit, the most recent matches are returned.
    pub fn query(&self, query: &EventQuery) -> Vec<Event> {
        let history = self.history.read();
        let mut matches: Vec<Event> = history
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            if matches.len() > limit {
                matches.drain(..matches.len() - limit);
            }
        }
        matches
    }

    /// Events excluded from flushes because they failed to encode
    pub fn malformed_events(&self) -> Vec<MalformedEvent> {
        self.malformed.lock().iter().cloned().collect()
    }

    /// Number of events waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Wakes when the buffer reaches the flush batch size
    pub(crate) fn flush_signal(&self) -> &Notify {
        &self.flush_signal
    }

    pub fn stats(&self) -> EventLogStats {
        EventLogStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            dropped_below_level: self.counters.dropped_below_level.load(Ordering::Relaxed),
            flushed: self.counters.flushed.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            failed_flushes: self.counters.failed_flushes.load(Ordering::Relaxed),
            buffered: self.buffered(),
            retained: self.history.read().len(),
        }
    }

    /// Drop all buffered and retained events
    pub fn clear(&self) {
        self.buffer.lock().clear();
        self.history.write().clear();
        self.malformed.lock().clear();
    }
}

/// A batch taken from the buffer that has not reached the sink yet
struct InFlight<'a> {
    log: &'a StructuredEventLog,
    batch: Option<Vec<Event>>,
}

impl InFlight<'_> {
    fn delivered(mut self) {
        self.batch = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            self.log.restore(batch);
        }
    }
}

fn echo(event: &Event) {
    let correlation_id = event.correlation_id.as_deref().unwrap_or("-");
    let operation = event.operation.as_deref().unwrap_or("-");
    match event.level {
        EventLevel::Debug => debug!(
            service = %event.service,
            operation,
            correlation_id,
            "{}",
            event.message
        ),
        EventLevel::Info => info!(
            service = %event.service,
            operation,
            correlation_id,
            "{}",
            event.message
        ),
        EventLevel::Warn => warn!(
            service = %event.service,
            operation,
            correlation_id,
            "{}",
            event.message
        ),
        EventLevel::Error | EventLevel::Fatal => error!(
            service = %event.service,
            operation,
            correlation_id,
            level = %event.level,
            "{}",
            event.message
        ),
    }
}
