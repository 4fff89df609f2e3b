use std::io::Write;

use anyhow::Result;

use delegate_core::clock::SharedClock;
use delegate_core::config::Settings;
use delegate_core::idle::{IdleTracker, IdleTrackerSpec};
use delegate_core::ipc::IpcDir;
use delegate_core::layout::StateLayout;

/// Mark the user active and hand any pending daemon request to the agent.
///
/// Activity goes through `last-activity.txt`, where the daemon's tracker
/// picks it up on its next check.
pub fn prompt_submit(
    layout: &StateLayout,
    settings: &Settings,
    clock: SharedClock,
    out: &mut impl Write,
) -> Result<()> {
    let ipc = IpcDir::open(layout.clone())?;

    let mut tracker = IdleTracker::new(
        layout,
        IdleTrackerSpec::plan(settings.daemon.idle_timeout_minutes),
        clock,
    );
    tracker.record_activity()?;

    if let Some(request) = ipc.take_request()? {
        tracing::debug!("Delivering daemon request {}", request.id);
        writeln!(out, "{}", request.render_directive())?;
    }
    Ok(())
}
