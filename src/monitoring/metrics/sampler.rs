//! Resource sampler contract
//!
//! The pipeline never measures the operating system itself; it asks a
//! [`ResourceSampler`] for numeric snapshots.

use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Point-in-time resource usage supplied by an external collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub network_bytes: u64,
    pub sampled_at: DateTime<Utc>,
}

impl ResourceSample {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_bytes, self.memory_total_bytes)
    }

    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used_bytes, self.disk_total_bytes)
    }

    pub fn memory_used_mb(&self) -> f64 {
        self.memory_used_bytes as f64 / (1024.0 * 1024.0)
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Provides current cpu/memory/disk/network usage on demand
pub trait ResourceSampler: Send + Sync + std::fmt::Debug {
    fn sample(&self) -> Result<ResourceSample>;
}

/// Sampler returning whatever sample it was last given
///
/// Useful when another subsystem already measures resources and pushes them in.
#[derive(Debug, Default)]
pub struct StaticSampler {
    current: RwLock<ResourceSample>,
}

impl StaticSampler {
    pub fn new(sample: ResourceSample) -> Self {
        Self {
            current: RwLock::new(sample),
        }
    }

    pub fn set(&self, sample: ResourceSample) {
        *self.current.write() = sample;
    }
}

impl ResourceSampler for StaticSampler {
    fn sample(&self) -> Result<ResourceSample> {
        let mut sample = self.current.read().clone();
        sample.sampled_at = Utc::now();
        Ok(sample)
    }
}
