//! Transport-independent control operations

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{
    ResourceUsage, StartOutcome, Supervisor, SupervisorError, WorkloadId, WorkloadInfo,
};

type Result<T> = std::result::Result<T, SupervisorError>;

/// Control function requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlFunction {
    Start,
    /// Graceful termination
    Stop,
    /// Forced termination
    Kill,
    Status,
}

impl FromStr for ControlFunction {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "kill" | "end" => Ok(Self::Kill),
            "status" => Ok(Self::Status),
            other => Err(SupervisorError::Validation(format!(
                "unknown fn value {:?}",
                other
            ))),
        }
    }
}

/// What a control call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Started,
    AlreadyRunning,
    Stopped,
    Killed,
    Status,
}

/// Confirmation returned by a successful control call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    #[serde(rename = "fn")]
    pub function: ControlFunction,
    pub outcome: Outcome,
    #[serde(flatten)]
    pub workload: WorkloadInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResourceUsage>,
}

/// List and control operations over a shared supervisor
#[derive(Clone)]
pub struct ControlApi {
    supervisor: Arc<Supervisor>,
}

impl ControlApi {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Every workload with its current state
    pub fn list(&self) -> Result<Vec<WorkloadInfo>> {
        self.supervisor.registry().snapshot()
    }

    /// Run `function` against workload `id`, both as received from the client
    pub fn control(&self, function: &str, id: &str) -> Result<ControlReply> {
        let function: ControlFunction = function.trim().parse()?;
        let raw: i64 = id
            .trim()
            .parse()
            .map_err(|_| SupervisorError::Validation(format!("bad id parameter {:?}", id)))?;
        let id = self.supervisor.registry().resolve(raw)?;

        self.dispatch(function, id)
    }

    /// Run an already validated control function
    pub fn dispatch(&self, function: ControlFunction, id: WorkloadId) -> Result<ControlReply> {
        let mut usage = None;
        let outcome = match function {
            ControlFunction::Start => match self.supervisor.start(id)? {
                StartOutcome::Started(_) => Outcome::Started,
                StartOutcome::AlreadyRunning(_) => Outcome::AlreadyRunning,
            },
            ControlFunction::Stop => {
                self.supervisor.kill(id, false)?;
                Outcome::Stopped
            }
            ControlFunction::Kill => {
                self.supervisor.kill(id, true)?;
                Outcome::Killed
            }
            ControlFunction::Status => {
                usage = self.supervisor.usage(id)?;
                Outcome::Status
            }
        };

        let workload = self.supervisor.status(id)?;
        if function != ControlFunction::Status {
            info!(
                "Control {:?} on workload {} -> {:?} (pid {})",
                function, id, outcome, workload.pid
            );
        }

        Ok(ControlReply {
            function,
            outcome,
            workload,
            usage,
        })
    }
}
