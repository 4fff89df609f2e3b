use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use delegate_core::ipc::IpcDir;
use delegate_core::layout::{StateLayout, WORKSPACE_ENV};

use crate::process;

/// PID of a live daemon, if the PID file names one
pub fn running_daemon(ipc: &IpcDir) -> Option<u32> {
    ipc.read_pid().filter(|pid| process::is_alive(*pid))
}

/// Start a detached daemon for `layout` unless one is running
pub fn session_start(layout: &StateLayout, out: &mut impl Write) -> Result<()> {
    let ipc = IpcDir::open(layout.clone())?;

    if let Some(pid) = running_daemon(&ipc) {
        writeln!(out, "[delegate] Daemon running (PID: {})", pid)?;
        return Ok(());
    }
    if let Some(stale) = ipc.read_pid() {
        tracing::debug!("Removing stale PID file for {}", stale);
        ipc.clear_pid()?;
    }

    let pid = spawn_detached(layout)?;
    writeln!(out, "[delegate] Daemon started (PID: {})", pid)?;
    Ok(())
}

/// Re-run this executable as `delegate daemon` in its own process group,
/// with stderr appended to the daemon log
fn spawn_detached(layout: &StateLayout) -> Result<u32> {
    let exe = std::env::current_exe().context("Failed to locate the delegate executable")?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(layout.log_file())
        .with_context(|| format!("Failed to open {:?}", layout.log_file()))?;

    let state_dir = layout
        .root()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let child = Command::new(&exe)
        .arg("--workspace")
        .arg(layout.workspace())
        .arg("--state-dir")
        .arg(&state_dir)
        .arg("daemon")
        .current_dir(layout.workspace())
        .env(WORKSPACE_ENV, layout.workspace())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log))
        .process_group(0)
        .spawn()
        .with_context(|| format!("Failed to spawn daemon: {:?}", exe))?;

    // Not waited on; the daemon outlives this hook
    Ok(child.id())
}

/// SIGTERM the daemon and remove its PID file
pub fn session_end(layout: &StateLayout, out: &mut impl Write) -> Result<()> {
    let ipc = IpcDir::open(layout.clone())?;
    let Some(pid) = ipc.read_pid() else {
        return Ok(());
    };

    match process::terminate(pid) {
        Ok(true) => writeln!(out, "[delegate] Daemon stopped (PID: {})", pid)?,
        Ok(false) => tracing::debug!("Daemon {} was not running", pid),
        Err(e) => tracing::warn!("Failed to stop daemon: {:#}", e),
    }

    ipc.clear_pid()
}
