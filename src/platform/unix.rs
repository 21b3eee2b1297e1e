//! Unix signal delivery

use anyhow::Result;

fn send_signal(pid: u32, signal: libc::c_int, action: &str) -> Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| anyhow::anyhow!("Failed to {} process: pid {} out of range", action, pid))?;
    if pid <= 0 {
        anyhow::bail!("Failed to {} process: invalid pid {}", action, pid);
    }

    // SAFETY: kill(2) has no memory-safety preconditions
    let result = unsafe { libc::kill(pid, signal) };
    if result == 0 {
        Ok(())
    } else {
        anyhow::bail!(
            "Failed to {} process: {}",
            action,
            std::io::Error::last_os_error()
        )
    }
}

/// Terminate a process gracefully (SIGTERM)
pub fn terminate_process(pid: u32) -> Result<()> {
    send_signal(pid, libc::SIGTERM, "terminate")
}

/// Force kill a process (SIGKILL)
pub fn kill_process(pid: u32) -> Result<()> {
    send_signal(pid, libc::SIGKILL, "kill")
}

/// Check if a process exists
pub fn is_process_running(pid: u32) -> bool {
    // Signal 0 checks if the process exists without sending a signal
    send_signal(pid, 0, "probe").is_ok()
}

/// Detach the calling (child) process into its own session
pub fn detach_session() -> std::io::Result<()> {
    // SAFETY: setsid is async-signal-safe and only affects the calling process
    if unsafe { libc::setsid() } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
