//! Workload model - Definitions and runtime state of managed workloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stable identifier for a workload (its index in the registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId(pub usize);

impl WorkloadId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a workload is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadMode {
    /// Direct OS process spawn
    #[serde(rename = "C")]
    Native,
    /// Delegated to the container runtime
    #[serde(rename = "D")]
    Container,
}

impl WorkloadMode {
    /// Parse the mode character used by the workload file
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::Native),
            'D' => Some(Self::Container),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Native => 'C',
            Self::Container => 'D',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Container => "container",
        }
    }
}

/// Externally visible status of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkloadStatus {
    Dead,
    Running,
}

impl WorkloadStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Identifier used to signal or query a running workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handle {
    /// OS process spawned by the supervisor
    Process { pid: u32 },
    /// Container started through the runtime
    Container { id: String, pid: Option<u32> },
}

impl Handle {
    /// OS process id behind this handle, if known
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Process { pid } => Some(*pid),
            Self::Container { pid, .. } => *pid,
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        match self {
            Self::Process { .. } => None,
            Self::Container { id, .. } => Some(id),
        }
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process { pid } => write!(f, "pid {}", pid),
            Self::Container { id, pid: Some(pid) } => write!(f, "container {} (pid {})", id, pid),
            Self::Container { id, pid: None } => write!(f, "container {}", id),
        }
    }
}

/// Immutable definition of a workload, as loaded from the workload file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Human-readable label
    pub description: String,
    /// Launch backend
    pub mode: WorkloadMode,
    /// Command line (native) or container reference (container)
    pub target: String,
    /// Directory to launch in (native only, None = inherit)
    pub working_directory: Option<PathBuf>,
}

impl WorkloadSpec {
    pub fn new(description: impl Into<String>, mode: WorkloadMode, target: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            mode,
            target: target.into(),
            working_directory: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Whitespace-separated tokens of the target. Quoting is not supported.
    pub fn argv(&self) -> Vec<&str> {
        self.target.split_whitespace().collect()
    }
}

/// Dead/Running state machine; a handle exists exactly while running
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Dead,
    Running(Handle),
}

impl Lifecycle {
    pub fn status(&self) -> WorkloadStatus {
        match self {
            Self::Dead => WorkloadStatus::Dead,
            Self::Running(_) => WorkloadStatus::Running,
        }
    }

    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Self::Dead => None,
            Self::Running(handle) => Some(handle),
        }
    }
}

/// Mutable runtime record of a workload
#[derive(Debug, Clone, Default)]
pub struct RuntimeRecord {
    pub lifecycle: Lifecycle,
    /// When the workload was last started
    pub started_at: Option<DateTime<Utc>>,
    /// When the workload last stopped
    pub stopped_at: Option<DateTime<Utc>>,
    /// Why the workload last stopped
    pub last_exit: Option<String>,
}

impl RuntimeRecord {
    /// Mark the workload as running under `handle`
    pub fn mark_running(&mut self, handle: Handle) {
        self.lifecycle = Lifecycle::Running(handle);
        self.started_at = Some(Utc::now());
        self.stopped_at = None;
        self.last_exit = None;
    }

    /// Mark the workload as dead, clearing its handle
    pub fn mark_dead(&mut self, reason: Option<String>) {
        self.lifecycle = Lifecycle::Dead;
        self.stopped_at = Some(Utc::now());
        self.last_exit = reason;
    }
}

/// Point-in-time view of one workload, as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub id: usize,
    pub desc: String,
    pub status: WorkloadStatus,
    pub mode: WorkloadMode,
    /// -1 when dead, 0 for a running container without a known pid
    pub pid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<String>,
}

impl WorkloadInfo {
    pub fn new(id: WorkloadId, spec: &WorkloadSpec, record: &RuntimeRecord) -> Self {
        let handle = record.lifecycle.handle();
        let pid = match handle {
            None => -1,
            Some(handle) => handle.pid().map(i64::from).unwrap_or(0),
        };

        Self {
            id: id.index(),
            desc: spec.description.clone(),
            status: record.lifecycle.status(),
            mode: spec.mode,
            pid,
            handle: handle.and_then(|h| h.container_id()).map(str::to_string),
            started_at: record.started_at,
            stopped_at: record.stopped_at,
            last_exit: record.last_exit.clone(),
        }
    }
}
