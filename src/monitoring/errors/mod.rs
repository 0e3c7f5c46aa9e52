//! Error fingerprinting and tracking
//!
//! Occurrences with the same name, message and leading stack frames collapse
//! into one [`ErrorRecord`]. Records are classified once, when first seen.

mod classifier;
mod fingerprint;
mod index;
mod types;

pub use classifier::classify;
pub use fingerprint::{fingerprint, stack_digest};
pub use index::ErrorFingerprintIndex;
pub use types::{
    ErrorAnalytics, ErrorCategory, ErrorContext, ErrorFilter, ErrorPattern, ErrorRecord,
    ErrorSeverity, ErrorStatus, RepresentativeError, Resolution, ResolveOutcome, TrackedError,
};
