//! Error handling utilities
//!
//! This module provides the error taxonomy shared by every pipeline component.

pub mod error;

// Re-export commonly used types
pub use error::*;
