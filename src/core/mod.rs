//! Core module - Workload registry, supervisor, backends and configuration

pub mod backend;
pub mod config;
mod error;
mod monitor;
mod reaper;
mod registry;
pub mod resource;
pub mod settings;
mod supervisor;
mod workload;

pub use config::{load_workloads, ConfigError};
pub use error::SupervisorError;
pub use monitor::ResourceMonitor;
pub use reaper::spawn_reaper;
pub use registry::WorkloadRegistry;
pub use resource::ResourceUsage;
pub use settings::Settings;
pub use supervisor::{StartOutcome, Supervisor, SupervisorOptions};
pub use workload::{
    Handle, Lifecycle, RuntimeRecord, WorkloadId, WorkloadInfo, WorkloadMode, WorkloadSpec,
    WorkloadStatus,
};
