//! Workspace file watching.
//!
//! `notify` delivers raw events on its own thread. They are filtered against
//! the configured globs, then debounced per path on the tokio runtime so a
//! file is reported once its writes have settled.

mod filter;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::WatchSettings;

pub use filter::WatchFilter;

/// Recursive watcher over the workspace root
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    changes: mpsc::UnboundedReceiver<PathBuf>,
    debounce: JoinHandle<()>,
    patterns: Vec<String>,
}

impl FileWatcher {
    /// Start watching `root`. Must be called inside a tokio runtime.
    pub fn start(root: &Path, settings: &WatchSettings) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace root: {:?}", root))?;
        let filter = WatchFilter::new(&root, settings)?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_content_change(&event.kind) => {
                    for path in event.paths {
                        if filter.matches(&path) {
                            let _ = raw_tx.send(path);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("File watcher error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {:?}", root))?;

        let (tx, changes) = mpsc::unbounded_channel();
        let stability = Duration::from_millis(settings.stability_ms);
        let debounce = tokio::spawn(debounce_paths(raw_rx, tx, stability));

        tracing::info!("Watching patterns: {}", settings.patterns.join(", "));
        tracing::info!("Ignoring: {}", settings.ignore.join(", "));

        Ok(Self {
            watcher: Some(watcher),
            changes,
            debounce,
            patterns: settings.patterns.clone(),
        })
    }

    /// Next settled path. `None` once the watcher is stopped.
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        self.changes.recv().await
    }

    /// Include patterns, as reported in the daemon status
    pub fn watching(&self) -> &[String] {
        &self.patterns
    }

    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            self.debounce.abort();
            self.changes.close();
            tracing::info!("File watcher stopped");
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.debounce.abort();
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Forward each path once no event has arrived for it for `stability`
async fn debounce_paths(
    mut raw: mpsc::UnboundedReceiver<PathBuf>,
    out: mpsc::UnboundedSender<PathBuf>,
    stability: Duration,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let next_due = pending.values().min().copied();
        tokio::select! {
            received = raw.recv() => match received {
                Some(path) => {
                    pending.insert(path, Instant::now() + stability);
                }
                None => break,
            },
            _ = sleep_until_due(next_due) => {
                let now = Instant::now();
                let mut settled: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, due)| **due <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                settled.sort();
                for path in settled {
                    pending.remove(&path);
                    if out.send(path).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_change_kinds() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Name(
            RenameMode::To
        ))));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        ))));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Name(
            RenameMode::From
        ))));
        assert!(!is_content_change(&EventKind::Remove(
            notify::event::RemoveKind::File
        )));
    }

    #[tokio::test]
    async fn test_debounce_coalesces_bursts_per_path() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_paths(raw_rx, tx, Duration::from_millis(50)));

        for _ in 0..5 {
            raw_tx.send(PathBuf::from("a.ts")).unwrap();
        }
        raw_tx.send(PathBuf::from("b.ts")).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let mut got = vec![first, second];
        got.sort();
        assert_eq!(got, vec![PathBuf::from("a.ts"), PathBuf::from("b.ts")]);

        // Nothing else was queued
        assert!(
            tokio::time::timeout(Duration::from_millis(150), rx.recv())
                .await
                .is_err()
        );

        drop(raw_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_watcher_reports_settled_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        let settings = WatchSettings {
            stability_ms: 50,
            ..WatchSettings::default()
        };
        let mut watcher = FileWatcher::start(&root, &settings).unwrap();
        assert_eq!(watcher.watching(), settings.patterns.as_slice());

        std::fs::write(root.join("notes.md"), "skip").unwrap();
        std::fs::write(root.join("node_modules").join("dep.ts"), "skip").unwrap();
        std::fs::write(root.join("a.ts"), "// @delegate: tidy up\n").unwrap();

        let changed = tokio::time::timeout(Duration::from_secs(5), watcher.next_change())
            .await
            .unwrap();
        assert_eq!(changed, Some(root.join("a.ts")));

        // Create and write events for the same file collapse into one report
        assert!(
            tokio::time::timeout(Duration::from_millis(300), watcher.next_change())
                .await
                .is_err()
        );

        watcher.stop();
        assert_eq!(watcher.next_change().await, None);
    }
}
