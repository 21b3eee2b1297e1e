//! Process supervisor - Start/kill/status state machine and child reaping

use std::collections::HashMap;
use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::backend::{ContainerBackend, LaunchBackend, NativeBackend};
use super::error::{Result, SupervisorError};
use super::monitor::ResourceMonitor;
use super::registry::WorkloadRegistry;
use super::resource::ResourceUsage;
use super::settings::Settings;
use super::workload::{Handle, Lifecycle, WorkloadId, WorkloadInfo, WorkloadMode};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a successful `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process or container was launched
    Started(Handle),
    /// The workload was already running; nothing was launched
    AlreadyRunning(Handle),
}

impl StartOutcome {
    pub fn handle(&self) -> &Handle {
        match self {
            Self::Started(handle) | Self::AlreadyRunning(handle) => handle,
        }
    }
}

/// Tunables for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Container runtime command line
    pub container_runtime: String,
    /// Bound on each container runtime invocation
    pub runtime_timeout: Duration,
    /// How long shutdown waits for native workloads before SIGKILL
    pub shutdown_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SupervisorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            container_runtime: settings.container_runtime.clone(),
            runtime_timeout: settings.runtime_timeout(),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

/// A signalled native child waiting to be reaped
struct Signalled {
    id: WorkloadId,
    child: Child,
    since: Instant,
    reported: bool,
}

/// Owns the workload lifecycle.
///
/// Lock order: registry operation guard, then `children`/`exited`, then the
/// registry record lock.
pub struct Supervisor {
    registry: Arc<WorkloadRegistry>,
    native: NativeBackend,
    container: ContainerBackend,
    /// Live native children, keyed by workload
    children: Mutex<HashMap<WorkloadId, Child>>,
    /// Signalled children waiting to be reaped
    exited: Mutex<Vec<Signalled>>,
    monitor: ResourceMonitor,
    shutdown_grace: Duration,
}

impl Supervisor {
    pub fn new(registry: Arc<WorkloadRegistry>, options: SupervisorOptions) -> Self {
        Self {
            registry,
            native: NativeBackend::new(),
            container: ContainerBackend::new(&options.container_runtime, options.runtime_timeout),
            children: Mutex::new(HashMap::new()),
            exited: Mutex::new(Vec::new()),
            monitor: ResourceMonitor::new(),
            shutdown_grace: options.shutdown_grace,
        }
    }

    pub fn registry(&self) -> &Arc<WorkloadRegistry> {
        &self.registry
    }

    fn backend(&self, mode: WorkloadMode) -> &dyn LaunchBackend {
        match mode {
            WorkloadMode::Native => &self.native,
            WorkloadMode::Container => &self.container,
        }
    }

    fn children(&self) -> Result<MutexGuard<'_, HashMap<WorkloadId, Child>>> {
        self.children
            .lock()
            .map_err(|_| SupervisorError::LockPoisoned("children"))
    }

    fn exited(&self) -> Result<MutexGuard<'_, Vec<Signalled>>> {
        self.exited
            .lock()
            .map_err(|_| SupervisorError::LockPoisoned("exited children"))
    }

    /// Start a workload. Starting a running workload returns its existing handle.
    pub fn start(&self, id: WorkloadId) -> Result<StartOutcome> {
        let spec = self.registry.spec(id)?;
        let _op = self.registry.op_guard(id)?;

        if let Lifecycle::Running(handle) = self.registry.lifecycle(id)? {
            debug!("Workload {} already running ({})", id, handle);
            return Ok(StartOutcome::AlreadyRunning(handle));
        }

        if spec.target.trim().is_empty() {
            return Err(SupervisorError::Validation(format!(
                "workload {} has an empty target",
                id
            )));
        }

        let backend = self.backend(spec.mode);
        info!(
            "Starting workload {} '{}' via {} backend",
            id,
            spec.description,
            backend.name()
        );

        let launched = backend.launch(spec).map_err(|e| SupervisorError::Spawn {
            id,
            reason: format!("{:#}", e),
        })?;
        let handle = launched.handle;

        if let Err(e) = self.record_running(id, &handle, launched.child) {
            // Do not leave an untracked workload behind
            if let Err(kill_err) = backend.terminate(spec, &handle, true) {
                error!("Failed to clean up workload {} after {}: {:#}", id, e, kill_err);
            }
            return Err(e);
        }

        info!("Workload {} running ({})", id, handle);
        Ok(StartOutcome::Started(handle))
    }

    fn record_running(&self, id: WorkloadId, handle: &Handle, child: Option<Child>) -> Result<()> {
        if let Some(child) = child {
            self.children()?.insert(id, child);
        }
        self.registry.set_running(id, handle.clone())
    }

    /// Stop a running workload, gracefully unless `force` is set
    pub fn kill(&self, id: WorkloadId, force: bool) -> Result<Handle> {
        let spec = self.registry.spec(id)?;
        let _op = self.registry.op_guard(id)?;

        let handle = match self.registry.lifecycle(id)? {
            Lifecycle::Dead => return Err(SupervisorError::NotRunning(id)),
            Lifecycle::Running(handle) => handle,
        };

        info!(
            "{} workload {} '{}' ({})",
            if force { "Killing" } else { "Stopping" },
            id,
            spec.description,
            handle
        );

        self.backend(spec.mode)
            .terminate(spec, &handle, force)
            .map_err(|e| SupervisorError::Kill {
                id,
                reason: format!("{:#}", e),
            })?;

        // Keep the child until its exit status is collected
        if let Some(child) = self.children()?.remove(&id) {
            self.exited()?.push(Signalled {
                id,
                child,
                since: Instant::now(),
                reported: false,
            });
        }

        let reason = if force { "killed" } else { "stopped" };
        self.registry.set_dead(id, Some(reason.to_string()))?;
        self.collect_exited()?;

        Ok(handle)
    }

    /// Current state of a workload
    pub fn status(&self, id: WorkloadId) -> Result<WorkloadInfo> {
        self.registry.get(id)
    }

    /// Resource usage of a running workload with a known OS process
    pub fn usage(&self, id: WorkloadId) -> Result<Option<ResourceUsage>> {
        let usage = match self.registry.lifecycle(id)? {
            Lifecycle::Running(handle) => handle
                .pid()
                .and_then(|pid| self.monitor.process_usage(pid)),
            Lifecycle::Dead => None,
        };
        Ok(usage)
    }

    /// Detect native workloads that exited on their own and mark them dead.
    /// Returns how many workloads transitioned.
    pub fn reap(&self) -> Result<usize> {
        let mut reaped = 0;

        for id in self.registry.ids() {
            if self.registry.spec(id)?.mode != WorkloadMode::Native {
                continue;
            }
            // A start/kill in flight owns this id; look again next sweep
            let Some(_op) = self.registry.try_op_guard(id)? else {
                continue;
            };

            let mut children = self.children()?;
            let Some(child) = children.get_mut(&id) else {
                continue;
            };

            match child.try_wait() {
                Ok(Some(status)) => {
                    children.remove(&id);
                    drop(children);
                    info!("Workload {} exited on its own ({})", id, status);
                    self.registry
                        .set_dead(id, Some(format!("exited: {}", status)))?;
                    reaped += 1;
                }
                Ok(None) => {}
                Err(e) => warn!("Error checking workload {}: {}", id, e),
            }
        }

        self.collect_exited()?;
        Ok(reaped)
    }

    /// Reap signalled children that have exited
    fn collect_exited(&self) -> Result<()> {
        let grace = self.shutdown_grace;
        self.exited()?.retain_mut(|signalled| match signalled.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Reaped workload {} child ({})", signalled.id, status);
                false
            }
            Ok(None) => {
                if !signalled.reported && signalled.since.elapsed() >= grace {
                    warn!(
                        "Workload {} child (pid {}) still alive {:?} after being stopped",
                        signalled.id,
                        signalled.child.id(),
                        grace
                    );
                    signalled.reported = true;
                }
                true
            }
            Err(e) => {
                warn!("Error reaping workload {} child: {}", signalled.id, e);
                false
            }
        });
        Ok(())
    }

    /// Workloads whose stopped child has outlived the shutdown grace period
    pub fn lingering_children(&self) -> Result<Vec<WorkloadId>> {
        self.collect_exited()?;
        Ok(self
            .exited()?
            .iter()
            .filter(|signalled| signalled.reported)
            .map(|signalled| signalled.id)
            .collect())
    }

    /// Number of signalled children not reaped yet
    pub fn pending_reap_count(&self) -> usize {
        self.exited.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Wait up to `timeout` for the signalled child of `id` to exit
    fn wait_for_exit(&self, id: WorkloadId, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            self.collect_exited()?;
            if !self.exited()?.iter().any(|signalled| signalled.id == id) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    /// Gracefully stop every running workload. Errors are logged, not returned.
    pub fn shutdown_all(&self) {
        let running: Vec<WorkloadId> = self
            .registry
            .ids()
            .filter(|&id| {
                self.registry
                    .lifecycle(id)
                    .map(|l| l.status().is_running())
                    .unwrap_or(false)
            })
            .collect();
        info!("Shutting down {} running workloads", running.len());

        for id in running {
            let handle = match self.kill(id, false) {
                Ok(handle) => handle,
                Err(SupervisorError::NotRunning(_)) => continue,
                Err(e) => {
                    error!("Failed to stop workload {}: {}", id, e);
                    continue;
                }
            };

            let Handle::Process { pid } = handle else {
                continue;
            };
            match self.wait_for_exit(id, self.shutdown_grace) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "Workload {} ignored SIGTERM for {:?}, sending SIGKILL",
                        id, self.shutdown_grace
                    );
                    if let Err(e) = crate::platform::kill_process(pid) {
                        error!("Failed to kill workload {}: {:#}", id, e);
                    }
                    let _ = self.wait_for_exit(id, self.shutdown_grace);
                }
                Err(e) => error!("Failed waiting for workload {}: {}", id, e),
            }
        }

        // Children stopped earlier that never exited
        match self.exited() {
            Ok(mut exited) => {
                for signalled in exited.iter_mut() {
                    warn!(
                        "Killing lingering workload {} child (pid {})",
                        signalled.id,
                        signalled.child.id()
                    );
                    let _ = signalled.child.kill();
                    let _ = signalled.child.wait();
                }
                exited.clear();
            }
            Err(e) => error!("Failed to collect lingering children: {}", e),
        }
    }
}
