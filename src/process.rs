//! Liveness and termination of the daemon process by PID.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Whether a process with `pid` exists.
///
/// A process we may not signal (`EPERM`) still counts as running.
pub fn is_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send `SIGTERM`. Returns `false` if the process was already gone.
pub fn terminate(pid: u32) -> Result<bool> {
    let Some(target) = to_pid(pid) else {
        return Ok(false);
    };
    match kill(target, Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to signal process {}", pid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_alive(std::process::id()));
        assert!(!is_alive(0));
    }

    #[test]
    fn test_terminate_running_child() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();

        assert!(terminate(child.id()).unwrap());
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_terminate_exited_process() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!is_alive(pid));
        assert!(!terminate(pid).unwrap());
    }
}
