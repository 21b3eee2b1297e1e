//! Container backend - Start and stop delegated to a container runtime CLI

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{LaunchBackend, Launched};
use crate::core::workload::{Handle, WorkloadSpec};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Outcome of one runtime invocation
#[derive(Debug)]
struct Invocation {
    /// None when the invocation was cut off by the timeout
    status: Option<ExitStatus>,
    stdout: String,
    stderr: String,
}

impl Invocation {
    fn succeeded(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    fn describe_failure(&self) -> String {
        let status = match self.status {
            Some(status) => status.to_string(),
            None => "timed out".to_string(),
        };
        match self.stderr.trim() {
            "" => status,
            stderr => format!("{}: {}", status, stderr),
        }
    }
}

/// Delegates workloads to `docker` (or a compatible runtime CLI)
#[derive(Debug, Clone)]
pub struct ContainerBackend {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ContainerBackend {
    /// `runtime` is a command line; leading tokens after the program are passed
    /// before every sub-command (e.g. "sudo docker")
    pub fn new(runtime: &str, timeout: Duration) -> Self {
        let mut tokens = runtime.split_whitespace().map(str::to_string);
        let program = tokens.next().unwrap_or_else(|| "docker".to_string());
        Self {
            program,
            base_args: tokens.collect(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `<runtime> args...`, waiting at most `self.timeout`
    fn invoke(&self, args: &[&str]) -> Result<Invocation> {
        debug!("Invoking {} {:?} {:?}", self.program, self.base_args, args);

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run container runtime {:?}", self.program))?;

        // Pipes are read concurrently with the wait
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = wait_bounded(&mut child, deadline)?;

        let (stdout, stderr) = match status {
            Some(_) => (collect(&stdout, deadline), collect(&stderr, deadline)),
            None => (String::new(), String::new()),
        };

        Ok(Invocation {
            status,
            stdout,
            stderr,
        })
    }

    /// Main process id of a running container, if the runtime reports one
    fn inspect_pid(&self, container: &str) -> Option<u32> {
        match self.invoke(&["inspect", "--format", "{{.State.Pid}}", container]) {
            Ok(inv) if inv.succeeded() => inv.stdout.trim().parse().ok().filter(|&pid| pid > 0),
            Ok(inv) => {
                debug!("inspect {} failed: {}", container, inv.describe_failure());
                None
            }
            Err(e) => {
                debug!("inspect {} failed: {:#}", container, e);
                None
            }
        }
    }
}

/// Read `pipe` to the end on a helper thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!("Error reading container runtime output: {}", e);
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

/// Output drained so far; a pipe still held open by a runtime descendant past
/// `deadline` yields nothing
fn collect(rx: &Receiver<String>, deadline: Instant) -> String {
    let remaining = deadline
        .saturating_duration_since(Instant::now())
        .max(POLL_INTERVAL);
    rx.recv_timeout(remaining).unwrap_or_default()
}

/// Poll `child` until it exits or `deadline` passes; a timed-out child is killed
fn wait_bounded(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

impl LaunchBackend for ContainerBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    fn launch(&self, spec: &WorkloadSpec) -> Result<Launched> {
        let argv = spec.argv();
        let reference = *argv.first().context("Empty container reference")?;

        let mut args = vec!["start"];
        args.extend(&argv);
        let inv = self.invoke(&args)?;
        if !inv.succeeded() {
            anyhow::bail!(
                "{} start {} failed: {}",
                self.program,
                spec.target,
                inv.describe_failure()
            );
        }

        let id = inv
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(reference)
            .to_string();
        let pid = self.inspect_pid(&id);

        Ok(Launched {
            handle: Handle::Container { id, pid },
            child: None,
        })
    }

    fn terminate(&self, spec: &WorkloadSpec, handle: &Handle, force: bool) -> Result<()> {
        let container = match handle.container_id() {
            Some(id) => id.to_string(),
            None => spec
                .argv()
                .first()
                .map(|s| s.to_string())
                .context("Empty container reference")?,
        };

        let verb = if force { "kill" } else { "stop" };
        let inv = self.invoke(&[verb, container.as_str()])?;
        if inv.succeeded() {
            return Ok(());
        }

        if inv.status.is_none() && !force {
            warn!(
                "{} stop {} timed out after {:?}, escalating to kill",
                self.program, container, self.timeout
            );
            let inv = self.invoke(&["kill", container.as_str()])?;
            if inv.succeeded() {
                return Ok(());
            }
            anyhow::bail!(
                "{} kill {} failed: {}",
                self.program,
                container,
                inv.describe_failure()
            );
        }

        anyhow::bail!(
            "{} {} {} failed: {}",
            self.program,
            verb,
            container,
            inv.describe_failure()
        )
    }
}
