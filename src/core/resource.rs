//! Resource usage reporting

use serde::{Deserialize, Serialize};

/// Current resource usage of a workload's process
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU usage percentage since the previous sample
    pub cpu_percent: f32,
    /// Resident memory in bytes
    pub memory_bytes: u64,
    /// Virtual memory in bytes
    pub virtual_memory_bytes: u64,
    /// Process uptime in seconds
    pub run_time_secs: u64,
}
