//! On-disk layout of the per-workspace state directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default state directory name, relative to the workspace root
pub const DEFAULT_STATE_DIR: &str = ".delegate";

/// Environment variable naming the workspace the daemon serves
pub const WORKSPACE_ENV: &str = "DELEGATE_WORKSPACE";

pub const PID_FILE: &str = "daemon.pid";
pub const STATUS_FILE: &str = "daemon.status";
pub const CONFIG_FILE: &str = "config.json";
pub const BUDGET_FILE: &str = "token-budget.json";
pub const ACTIVITY_FILE: &str = "last-activity.txt";
pub const REQUEST_FILE: &str = "daemon-request.json";
pub const LOG_FILE: &str = "daemon.log";
pub const TASKS_DIR: &str = "tasks";
pub const RESULTS_DIR: &str = "results";

/// Paths of every file the daemon and its clients share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    workspace: PathBuf,
    root: PathBuf,
}

impl StateLayout {
    /// Layout for `workspace` using the default `.delegate` directory
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self::with_dir_name(workspace, DEFAULT_STATE_DIR)
    }

    /// Layout for `workspace` with a custom state directory name
    /// (e.g. `.dreamstate`)
    pub fn with_dir_name(workspace: impl Into<PathBuf>, dir_name: &str) -> Self {
        let workspace = workspace.into();
        let root = workspace.join(dir_name);
        Self { workspace, root }
    }

    /// Create the state directory and the task/result subdirectories
    pub fn ensure(&self) -> Result<()> {
        for dir in [self.root.clone(), self.tasks_dir(), self.results_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create state directory: {:?}", dir))?;
        }
        Ok(())
    }

    /// Workspace root the state belongs to
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The state directory itself
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join(PID_FILE)
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn budget_file(&self) -> PathBuf {
        self.root.join(BUDGET_FILE)
    }

    pub fn activity_file(&self) -> PathBuf {
        self.root.join(ACTIVITY_FILE)
    }

    pub fn request_file(&self) -> PathBuf {
        self.root.join(REQUEST_FILE)
    }

    /// Where a detached daemon's stderr goes
    pub fn log_file(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    /// Path of a named file directly under the state directory
    /// (override flags such as `plan.state`)
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Resolve the workspace root: explicit argument, then
/// `DELEGATE_WORKSPACE`, then the current directory.
pub fn resolve_workspace(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(env) = std::env::var(WORKSPACE_ENV) {
        if !env.trim().is_empty() {
            return Ok(PathBuf::from(env));
        }
    }
    std::env::current_dir().context("Failed to determine current directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = StateLayout::new("/work");
        assert_eq!(layout.root(), Path::new("/work/.delegate"));
        assert_eq!(layout.pid_file(), PathBuf::from("/work/.delegate/daemon.pid"));
        assert_eq!(
            layout.tasks_dir(),
            PathBuf::from("/work/.delegate/tasks")
        );
        assert_eq!(
            layout.file("plan.state"),
            PathBuf::from("/work/.delegate/plan.state")
        );
    }

    #[test]
    fn test_custom_dir_name() {
        let layout = StateLayout::with_dir_name("/work", ".dreamstate");
        assert_eq!(
            layout.status_file(),
            PathBuf::from("/work/.dreamstate/daemon.status")
        );
    }

    #[test]
    fn test_ensure_creates_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(dir.path());
        layout.ensure().unwrap();
        assert!(layout.tasks_dir().is_dir());
        assert!(layout.results_dir().is_dir());
    }

    #[test]
    fn test_resolve_workspace_prefers_explicit() {
        temp_env::with_var(WORKSPACE_ENV, Some("/from/env"), || {
            let explicit = PathBuf::from("/explicit");
            assert_eq!(
                resolve_workspace(Some(&explicit)).unwrap(),
                PathBuf::from("/explicit")
            );
            assert_eq!(resolve_workspace(None).unwrap(), PathBuf::from("/from/env"));
        });
    }

    #[test]
    fn test_resolve_workspace_falls_back_to_cwd() {
        temp_env::with_var_unset(WORKSPACE_ENV, || {
            let cwd = std::env::current_dir().unwrap();
            assert_eq!(resolve_workspace(None).unwrap(), cwd);
        });
    }
}
