//! Structured event log
//!
//! Producers hand immutable [`Event`]s to the [`StructuredEventLog`], which
//! buffers them in memory and periodically flushes them to an [`EventSink`].

mod log;
mod query;
mod sink;
mod types;

pub use log::StructuredEventLog;
pub use query::EventQuery;
pub use sink::{DailyFileSink, EncodedEvent, EventSink, FanoutSink, HttpSink, encode_event};
pub use types::{
    Event, EventError, EventLevel, EventLogStats, FlushReport, MALFORMED_TAG, MalformedEvent,
    SPAN_END_TAG, SPAN_START_TAG,
};
