//! Resource sampler backed by the sysinfo crate
//!
//! Available with the `metrics` feature. It is one possible collaborator
//! behind [`ResourceSampler`]; nothing in the pipeline depends on it.

#![cfg(feature = "metrics")]

use super::sampler::{ResourceSample, ResourceSampler};
use crate::utils::error::Result;
use chrono::Utc;
use parking_lot::Mutex;
use sysinfo::{Disks, Networks, System};

/// Samples the local host
#[derive(Debug)]
pub struct SysinfoSampler {
    system: Mutex<System>,
    networks: Mutex<Networks>,
    disks: Mutex<Disks>,
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&self) -> Result<ResourceSample> {
        let (cpu_percent, memory_used_bytes, memory_total_bytes) = {
            let mut sys = self.system.lock();
            sys.refresh_cpu_usage();
            sys.refresh_memory();
            (
                sys.global_cpu_usage() as f64,
                sys.used_memory(),
                sys.total_memory(),
            )
        };

        let (disk_used_bytes, disk_total_bytes) = {
            let mut disks = self.disks.lock();
            disks.refresh_list();
            disks.iter().fold((0u64, 0u64), |(used, total), d| {
                (
                    used + d.total_space().saturating_sub(d.available_space()),
                    total + d.total_space(),
                )
            })
        };

        let network_bytes = {
            let mut networks = self.networks.lock();
            networks.refresh();
            networks
                .values()
                .map(|data| data.total_received() + data.total_transmitted())
                .sum()
        };

        Ok(ResourceSample {
            cpu_percent,
            memory_used_bytes,
            memory_total_bytes,
            disk_used_bytes,
            disk_total_bytes,
            network_bytes,
            sampled_at: Utc::now(),
        })
    }
}
