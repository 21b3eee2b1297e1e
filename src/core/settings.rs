//! Supervisor settings management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default control-plane port
pub const DEFAULT_PORT: u16 = 6755;

/// Supervisor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Control plane
    /// Address the HTTP control plane binds to
    pub bind_address: String,
    /// Port the HTTP control plane listens on
    pub port: u16,

    // Workloads
    /// Workload file (defaults to ~/.sermn/cmds.conf)
    pub workloads_file: Option<PathBuf>,
    /// Interval between reaping sweeps in ms
    pub reap_interval_ms: u64,

    // Container runtime
    /// Runtime command line, e.g. "docker", "podman" or "sudo docker"
    pub container_runtime: String,
    /// Upper bound on any single runtime invocation in seconds
    pub runtime_timeout_secs: u64,

    // Shutdown
    /// How long to wait for native workloads to exit before SIGKILL
    pub shutdown_grace_secs: u64,

    // Advanced
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,

            workloads_file: None,
            reap_interval_ms: 1000,

            container_runtime: "docker".to_string(),
            runtime_timeout_secs: 30,

            shutdown_grace_secs: 5,

            debug_logging: false,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid settings file {}", path.display()))?
            }
            None => Self::default(),
        };
        settings.validate();
        Ok(settings)
    }

    /// Settings file to use: `SERMN_SETTINGS`, else `<config_dir>/sermn/settings.json` if present
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("SERMN_SETTINGS") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("sermn").join("settings.json"))
            .filter(|path| path.exists())
    }

    /// Apply `SERMN_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = var("SERMN_BIND") {
            self.bind_address = bind;
        }
        if let Some(port) = var("SERMN_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid SERMN_PORT {:?}", port))?;
        }
        if let Some(conf) = var("SERMN_CONF") {
            self.workloads_file = Some(PathBuf::from(conf));
        }
        if let Some(runtime) = var("SERMN_RUNTIME") {
            self.container_runtime = runtime;
        }
        self.validate();
        Ok(())
    }

    /// Get the workload file, using the default location if not set
    pub fn get_workloads_file(&self) -> PathBuf {
        self.workloads_file.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".sermn")
                .join("cmds.conf")
        })
    }

    /// Address string for the listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.reap_interval_ms = self.reap_interval_ms.clamp(50, 60_000);
        self.runtime_timeout_secs = self.runtime_timeout_secs.max(1);
        if self.container_runtime.trim().is_empty() {
            self.container_runtime = "docker".to_string();
        }
    }
}
