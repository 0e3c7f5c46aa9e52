//! Utility modules for the observability pipeline
//!
//! ## Module Organization
//!
//! - **error**: Error taxonomy shared by every component
//! - **logging**: `tracing` subscriber setup for binaries and tests
//! - **time**: The clock abstraction used for timestamps, windows and escalation

pub mod error; // Error handling
pub mod logging; // Subscriber setup
pub mod time; // Clock abstraction

pub use error::{ErrorKind, ObservabilityError, Result};
pub use time::{Clock, ManualClock, SystemClock};

use uuid::Uuid;

/// Generate a unique identifier for events, spans, alerts and error records
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format duration as human readable string
pub fn format_duration(duration_ms: u64) -> String {
    if duration_ms < 1000 {
        format!("{}ms", duration_ms)
    } else if duration_ms < 60_000 {
        format!("{:.1}s", duration_ms as f64 / 1000.0)
    } else if duration_ms < 3_600_000 {
        format!("{:.1}m", duration_ms as f64 / 60_000.0)
    } else {
        format!("{:.1}h", duration_ms as f64 / 3_600_000.0)
    }
}

/// Truncate string to specified length with ellipsis, respecting char boundaries
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
