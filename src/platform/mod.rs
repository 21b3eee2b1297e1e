//! Platform-specific process signalling

#[cfg(unix)]
pub mod unix;

use anyhow::Result;

/// Terminate a process gracefully
pub fn terminate_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        unix::terminate_process(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        anyhow::bail!("Unsupported platform")
    }
}

/// Force kill a process
pub fn kill_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        unix::kill_process(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        anyhow::bail!("Unsupported platform")
    }
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unix::is_process_running(pid)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Run a native workload in its own session so terminal signals aimed at the
/// supervisor do not reach it
pub fn detach(cmd: &mut std::process::Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: the hook only calls setsid, which is async-signal-safe
        unsafe {
            cmd.pre_exec(unix::detach_session);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}
