//! Launch backends - How workloads are physically started and stopped

mod container;
mod native;

pub use container::ContainerBackend;
pub use native::NativeBackend;

use std::process::Child;

use anyhow::Result;

use super::workload::{Handle, WorkloadSpec};

/// Result of a successful launch
#[derive(Debug)]
pub struct Launched {
    /// Handle to record in the registry
    pub handle: Handle,
    /// Child process to reap, when the supervisor is its parent
    pub child: Option<Child>,
}

/// Capability shared by every execution backend.
///
/// Both calls block until the backend has an answer; the supervisor runs them
/// while holding only the per-workload operation guard.
pub trait LaunchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Launch the workload described by `spec`
    fn launch(&self, spec: &WorkloadSpec) -> Result<Launched>;

    /// Stop the workload behind `handle`, gracefully unless `force` is set
    fn terminate(&self, spec: &WorkloadSpec, handle: &Handle, force: bool) -> Result<()>;
}
