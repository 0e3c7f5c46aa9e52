//! Error tracking configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorTrackingConfig {
    /// Stack lines included in the fingerprint
    pub stack_frames: usize,
    /// Records whose last occurrence is older than this are evicted
    pub retention_secs: u64,
    /// Occurrence timestamps kept per record
    pub max_recent_occurrences: usize,
    pub sweep_interval_secs: u64,
}

impl Default for ErrorTrackingConfig {
    fn default() -> Self {
        Self {
            stack_frames: 5,
            retention_secs: 7 * 24 * 3600,
            max_recent_occurrences: 100,
            sweep_interval_secs: 3600,
        }
    }
}
