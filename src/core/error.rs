//! Supervisor error taxonomy

use thiserror::Error;

use super::workload::WorkloadId;

/// Errors returned by registry and supervisor operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Malformed request or workload definition
    #[error("{0}")]
    Validation(String),

    #[error("no workload with id {0}")]
    NotFound(i64),

    #[error("workload {0} is not running")]
    NotRunning(WorkloadId),

    #[error("failed to start workload {id}: {reason}")]
    Spawn { id: WorkloadId, reason: String },

    #[error("failed to stop workload {id}: {reason}")]
    Kill { id: WorkloadId, reason: String },

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl SupervisorError {
    /// Short machine-readable kind, used in error replies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::NotRunning(_) => "not_running",
            Self::Spawn { .. } => "spawn",
            Self::Kill { .. } => "kill",
            Self::LockPoisoned(_) | Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
