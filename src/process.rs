//! OS process helpers: liveness probes and process-group kills
//!
//! On Unix the runner places every child in its own process group, so a
//! signal to the negative pgid reaches the whole tree. Non-Unix builds get
//! conservative fallbacks.

/// Check whether a pid refers to a live process.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 {
        return false;
    }
    // Signal 0 probes existence without delivering anything. EPERM still
    // means the process exists.
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_alive(pid: u32) -> bool {
    // Without a cheap probe, assume alive; the stale sweep stays inert.
    pid != 0
}

/// Politely ask a process to stop (SIGTERM to the pid itself).
#[cfg(unix)]
pub fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if pid != 0 {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) {}

/// Force-kill an entire process group rooted at `pid`.
///
/// Escalates SIGTERM → SIGKILL on the negative pgid so orphaned
/// grandchildren (dev servers and the like) die with the agent. The pause
/// between the signals yields instead of blocking the runtime.
#[cfg(unix)]
pub async fn force_kill_group(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if pid == 0 {
        return;
    }
    let pgid = Pid::from_raw(-(pid as i32));
    let _ = kill(pgid, Signal::SIGTERM);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let _ = kill(pgid, Signal::SIGKILL);
}

#[cfg(not(unix))]
pub async fn force_kill_group(_pid: u32) {}
