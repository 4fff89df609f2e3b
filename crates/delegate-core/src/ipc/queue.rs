use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use thiserror::Error;

use super::request::DaemonRequest;
use super::types::{DaemonStatus, Task, TaskResult};
use crate::layout::StateLayout;
use crate::persist::{
    load_integer, load_json, remove_if_exists, save_json, save_text, LoadError, LoadResultExt,
};

#[derive(Debug, Error)]
pub enum IpcError {
    /// Ids become file names, so they are restricted to `[A-Za-z0-9_-]`
    #[error("invalid task id: {0:?}")]
    InvalidTaskId(String),
}

/// Handle on the shared state directory
pub struct IpcDir {
    layout: StateLayout,
    /// Corrupt task files already reported, so each is warned about once
    reported_corrupt: Mutex<HashSet<PathBuf>>,
}

impl IpcDir {
    /// Open the state directory, creating it and its subdirectories
    pub fn open(layout: StateLayout) -> Result<Self> {
        layout.ensure()?;
        Ok(Self {
            layout,
            reported_corrupt: Mutex::new(HashSet::new()),
        })
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    // Status

    pub fn write_status(&self, status: &DaemonStatus) -> Result<()> {
        save_json(&self.layout.status_file(), status)
    }

    pub fn read_status(&self) -> Option<DaemonStatus> {
        load_json(&self.layout.status_file()).fail_open()
    }

    // PID

    pub fn write_pid(&self, pid: u32) -> Result<()> {
        save_text(&self.layout.pid_file(), &pid.to_string())
    }

    pub fn read_pid(&self) -> Option<u32> {
        load_integer(&self.layout.pid_file())
            .fail_open()
            .and_then(|pid| u32::try_from(pid).ok())
            .filter(|pid| *pid > 0)
    }

    pub fn clear_pid(&self) -> Result<()> {
        remove_if_exists(&self.layout.pid_file())
    }

    // Task queue

    /// Write `tasks/{id}.json`, replacing any task with the same id
    pub fn submit_task(&self, task: &Task) -> Result<()> {
        let path = self.task_path(&task.id)?;
        save_json(&path, task)
    }

    /// All queued tasks, oldest first.
    ///
    /// Corrupt files are skipped so one bad file cannot wedge the queue.
    /// The file name is authoritative for the id, so a task whose body
    /// disagrees is still consumable.
    pub fn pending_tasks(&self) -> Result<Vec<Task>> {
        let tasks_dir = self.layout.tasks_dir();
        if !tasks_dir.exists() {
            self.reported_corrupt.lock().clear();
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&tasks_dir)
            .with_context(|| format!("Failed to read tasks directory: {:?}", tasks_dir))?;

        let mut tasks = Vec::new();
        let mut listed = HashSet::new();
        for entry in entries {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            listed.insert(path.clone());
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_valid_id(stem) {
                self.report_corrupt(&path, "file name is not a valid task id");
                continue;
            }

            match load_json::<Task>(&path) {
                Ok(mut task) => {
                    if task.id != stem {
                        tracing::debug!("Task file {:?} carries id {:?}", path, task.id);
                        task.id = stem.to_string();
                    }
                    tasks.push(task);
                }
                // Deleted between listing and reading
                Err(LoadError::NotFound { .. }) => {}
                Err(e) => self.report_corrupt(&path, &e.to_string()),
            }
        }

        // Forget reports for files removed since
        self.reported_corrupt
            .lock()
            .retain(|path| listed.contains(path));

        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    /// Delete a task file; absent is fine
    pub fn consume_task(&self, task_id: &str) -> Result<()> {
        let path = self.task_path(task_id)?;
        remove_if_exists(&path)?;
        self.reported_corrupt.lock().remove(&path);
        Ok(())
    }

    // Results

    pub fn write_result(&self, result: &TaskResult) -> Result<()> {
        let path = self.result_path(&result.task_id)?;
        save_json(&path, result)
    }

    pub fn read_result(&self, task_id: &str) -> Option<TaskResult> {
        let path = self.result_path(task_id).ok()?;
        load_json(&path).fail_open()
    }

    pub fn clear_result(&self, task_id: &str) -> Result<()> {
        remove_if_exists(&self.result_path(task_id)?)
    }

    // Requests for the prompt hook

    pub fn write_request(&self, request: &DaemonRequest) -> Result<()> {
        save_json(&self.layout.request_file(), request)
    }

    pub fn peek_request(&self) -> Option<DaemonRequest> {
        load_json(&self.layout.request_file()).fail_open()
    }

    /// Read and delete the pending request.
    ///
    /// An unparsable request file is deleted too, so it is not retried on
    /// every prompt.
    pub fn take_request(&self) -> Result<Option<DaemonRequest>> {
        let path = self.layout.request_file();
        match load_json::<DaemonRequest>(&path) {
            Ok(request) => {
                remove_if_exists(&path)?;
                Ok(Some(request))
            }
            Err(LoadError::NotFound { .. }) => Ok(None),
            Err(e) => {
                tracing::warn!("Discarding unreadable daemon request: {}", e);
                remove_if_exists(&path)?;
                Ok(None)
            }
        }
    }

    fn task_path(&self, task_id: &str) -> Result<PathBuf> {
        checked_id(task_id)?;
        Ok(self.layout.tasks_dir().join(format!("{}.json", task_id)))
    }

    fn result_path(&self, task_id: &str) -> Result<PathBuf> {
        checked_id(task_id)?;
        Ok(self.layout.results_dir().join(format!("{}.json", task_id)))
    }

    fn report_corrupt(&self, path: &Path, reason: &str) {
        if self.reported_corrupt.lock().insert(path.to_path_buf()) {
            tracing::warn!("Skipping corrupt task file {:?}: {}", path, reason);
        }
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn checked_id(id: &str) -> Result<(), IpcError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(IpcError::InvalidTaskId(id.to_string()))
    }
}
