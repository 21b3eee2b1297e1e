//! sermn - Remote process supervisor
//!
//! Loads the workload file, serves the HTTP control plane and reaps exited
//! workloads until interrupted, then stops everything it started.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use single_instance::SingleInstance;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sermn::api::{self, ControlApi};
use sermn::core::{
    load_workloads, spawn_reaper, Settings, Supervisor, SupervisorOptions, WorkloadRegistry,
};
use sermn::{APP_NAME, APP_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Load settings before logging so debug_logging can take effect
    let settings = load_settings()?;

    // Initialize logging
    init_logging(settings.debug_logging);

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    // Ensure only one supervisor is running
    let instance = SingleInstance::new(APP_NAME).context("Failed to create single instance lock")?;
    if !instance.is_single() {
        error!("Another instance of {} is already running!", APP_NAME);
        anyhow::bail!("{} is already running", APP_NAME);
    }

    // Load workloads; a missing or malformed file is fatal
    let workloads_file = settings.get_workloads_file();
    let workloads = load_workloads(&workloads_file)
        .with_context(|| format!("Cannot load workloads from {}", workloads_file.display()))?;

    let registry = Arc::new(WorkloadRegistry::new(workloads));
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&registry),
        SupervisorOptions::from(&settings),
    ));
    info!("Supervising {} workloads", registry.len());

    let reaper = spawn_reaper(Arc::clone(&supervisor), settings.reap_interval());

    let address = settings.listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind control plane to {}", address))?;

    let served = api::serve(
        listener,
        ControlApi::new(Arc::clone(&supervisor)),
        shutdown_signal(),
    )
    .await;

    info!("{} shutting down", APP_NAME);
    reaper.abort();

    let cleanup = Arc::clone(&supervisor);
    tokio::task::spawn_blocking(move || cleanup.shutdown_all())
        .await
        .context("Shutdown cleanup panicked")?;

    served.context("Control plane failed")
}

/// Settings file, then environment, then the optional workload file argument
fn load_settings() -> Result<Settings> {
    let mut settings = Settings::load(Settings::default_path().as_deref())?;
    settings.apply_env()?;
    if let Some(path) = std::env::args_os().nth(1) {
        settings.workloads_file = Some(PathBuf::from(path));
    }
    Ok(settings)
}

/// Initialize the logging system
fn init_logging(debug: bool) {
    let default = if debug { "sermn=debug" } else { "sermn=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
