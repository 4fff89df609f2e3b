//! Hosting the daemon in this process.

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};

use delegate_core::budget::TokenBudgetStore;
use delegate_core::clock::system_clock;
use delegate_core::config::Settings;
use delegate_core::daemon::{Daemon, DaemonDeps};
use delegate_core::idle::{IdleTracker, IdleTrackerSpec};
use delegate_core::ipc::IpcDir;
use delegate_core::layout::StateLayout;
use delegate_core::provider::ClaudeCli;
use delegate_core::watcher::FileWatcher;

/// Build the daemon for `layout` and run it until SIGINT or SIGTERM
pub async fn run(layout: StateLayout, settings: Settings) -> Result<()> {
    let ipc = IpcDir::open(layout.clone())?;
    let clock = system_clock();

    if settings.daemon.provider != "claude" {
        tracing::warn!(
            "Unsupported provider {:?}, using the claude CLI",
            settings.daemon.provider
        );
    }

    let budget = TokenBudgetStore::open(
        layout.budget_file(),
        settings.daemon.token_budget_per_hour,
        clock.clone(),
    );
    let tracker = IdleTracker::new(
        &layout,
        IdleTrackerSpec::plan(settings.daemon.idle_timeout_minutes),
        clock.clone(),
    );

    // The daemon still answers tasks without a watcher
    let watcher = match FileWatcher::start(layout.workspace(), &settings.watch) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!("File watching disabled: {:#}", e);
            None
        }
    };
    let watching = watcher
        .as_ref()
        .map(|w| w.watching().to_vec())
        .unwrap_or_default();

    let daemon = Daemon::new(DaemonDeps {
        provider: ClaudeCli::new(settings.daemon.custom_command.clone()),
        settings: settings.daemon,
        ipc,
        budget,
        tracker,
        clock,
        watching,
    });

    daemon.run(watcher, shutdown_signal()?).await
}

/// Resolves on the first SIGINT or SIGTERM
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => tracing::info!("Received SIGTERM"),
            _ = interrupt.recv() => tracing::info!("Received SIGINT"),
        }
    })
}
