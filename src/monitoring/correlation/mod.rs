//! Correlation tracking
//!
//! Issues correlation ids that link every event and span belonging to one
//! logical request chain, and garbage-collects them once they go idle.

mod tracker;

pub use tracker::{CorrelationContext, CorrelationTracker};
