//! Integration tests for pipeline-monitor
//!
//! These tests drive the service end to end with real sinks, channels and
//! temporary directories; only remote endpoints are mocked.

pub mod alerting_tests;
pub mod error_tracking_tests;
pub mod event_log_tests;
pub mod pipeline_tests;
