//! Native backend - Direct OS process spawn

use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::info;

use super::{LaunchBackend, Launched};
use crate::core::workload::{Handle, WorkloadSpec};
use crate::platform;

/// Spawns workloads as child processes of the supervisor
#[derive(Debug, Default, Clone)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LaunchBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn launch(&self, spec: &WorkloadSpec) -> Result<Launched> {
        let argv = spec.argv();
        let (program, args) = argv.split_first().context("Empty command line")?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        // Set working directory
        if let Some(ref work_dir) = spec.working_directory {
            cmd.current_dir(work_dir);
        }

        platform::detach(&mut cmd);

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| match spec.working_directory {
                Some(ref dir) => format!("Failed to spawn {:?} in {}", program, dir.display()),
                None => format!("Failed to spawn {:?}", program),
            })?;

        let pid = child.id();
        info!("Spawned '{}' with PID {}", spec.description, pid);

        Ok(Launched {
            handle: Handle::Process { pid },
            child: Some(child),
        })
    }

    fn terminate(&self, _spec: &WorkloadSpec, handle: &Handle, force: bool) -> Result<()> {
        let pid = handle
            .pid()
            .context("Native workload has no process id")?;

        if force {
            platform::kill_process(pid)
        } else {
            platform::terminate_process(pid)
        }
    }
}
