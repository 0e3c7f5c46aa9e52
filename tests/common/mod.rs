//! Common test utilities for pipeline-monitor
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::common::fixtures::ServiceFixture;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let fixture = ServiceFixture::new().await;
//!     let correlation_id = fixture.service.new_correlation(Default::default());
//!     // ...
//! }
//! ```

pub mod channels;
pub mod fixtures;

// Re-export commonly used items
pub use channels::RecordingChannel;
pub use fixtures::{EventFactory, RuleFactory, ServiceFixture};

/// Assert that a result is Ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a result is Err
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}
