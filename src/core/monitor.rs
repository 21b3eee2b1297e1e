//! Resource monitoring - Per-process usage sampling

use std::sync::Mutex;

use super::resource::ResourceUsage;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::trace;

/// Samples CPU and memory usage of workload processes
pub struct ResourceMonitor {
    system: Mutex<System>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Refresh and return usage for `pid`, or None if the process is gone.
    ///
    /// CPU usage is relative to the previous sample of the same pid, so the
    /// first sample reports 0.
    pub fn process_usage(&self, pid: u32) -> Option<ResourceUsage> {
        let mut system = self.system.lock().ok()?;
        let pid = Pid::from_u32(pid);

        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        trace!("Resource monitor refreshed pid {}", pid);

        let process = system.process(pid)?;
        Some(ResourceUsage {
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
            virtual_memory_bytes: process.virtual_memory(),
            run_time_secs: process.run_time(),
        })
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
