//! Client-side commands: talk to a running daemon through the state
//! directory.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use delegate_core::budget::{BudgetStatus, TokenBudgetStore};
use delegate_core::clock::SharedClock;
use delegate_core::ipc::{DaemonStatus, IpcDir, Task, TaskKind, TaskResult};

use crate::config::BudgetAction;
use crate::process;

const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What `delegate status` prints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub running: bool,
    pub pid: Option<u32>,
    pub status: Option<DaemonStatus>,
}

pub fn status(ipc: &IpcDir) -> StatusReport {
    let pid = ipc.read_pid();
    StatusReport {
        running: pid.is_some_and(process::is_alive),
        pid,
        status: ipc.read_status(),
    }
}

/// Queue a task and return it
pub fn submit(ipc: &IpcDir, kind: &str, payload: Option<&str>, clock: &SharedClock) -> Result<Task> {
    let payload = match payload {
        Some(raw) => serde_json::from_str(raw).context("Payload is not valid JSON")?,
        None => Value::Object(Default::default()),
    };
    let kind = TaskKind::from(kind.to_string());
    let task = Task::new(kind, payload, clock.now());
    ipc.submit_task(&task)?;
    tracing::debug!("Submitted {} ({})", task.kind, task.id);
    Ok(task)
}

/// Wait for the result of `task_id`, removing it once read.
///
/// On timeout the task is withdrawn so a daemon started later does not
/// answer a question nobody is waiting for.
pub async fn wait_for_result(ipc: &IpcDir, task_id: &str, timeout: Duration) -> Result<TaskResult> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(result) = ipc.read_result(task_id) {
            ipc.clear_result(task_id)?;
            return Ok(result);
        }
        if tokio::time::Instant::now() >= deadline {
            ipc.consume_task(task_id)?;
            anyhow::bail!("No response from daemon within {}ms", timeout.as_millis());
        }
        tokio::time::sleep(RESULT_POLL_INTERVAL).await;
    }
}

/// Submit a ping and wait for the pong
pub async fn ping(ipc: &IpcDir, timeout: Duration, clock: &SharedClock) -> Result<TaskResult> {
    let task = submit(ipc, "ping", None, clock)?;
    wait_for_result(ipc, &task.id, timeout).await
}

/// Show, pause, or resume the budget
pub fn budget(store: &mut TokenBudgetStore, action: BudgetAction) -> Result<BudgetStatus> {
    match action {
        BudgetAction::Show => {}
        BudgetAction::Pause => store.pause()?,
        BudgetAction::Resume => store.resume()?,
    }
    Ok(store.status())
}
