//! Test suite for pipeline-monitor
//!
//! ## Test Categories
//!
//! ### 1. Common Utilities (`common/`)
//! Shared test infrastructure:
//! - Service fixtures on a manual clock
//! - Event and rule factories
//! - Recording notification channels
//!
//! ### 2. Integration Tests (`integration/`)
//! Tests that drive the public API across components:
//! - Pipeline traces and correlation
//! - Event log sinks and flushing
//! - Error tracking
//! - Alert lifecycle and notification delivery
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all tests
//! cargo test --all-features
//!
//! # Run only unit tests
//! cargo test --lib --all-features
//!
//! # Run integration tests
//! cargo test --test lib --all-features
//! ```

pub mod common;
pub mod integration;
