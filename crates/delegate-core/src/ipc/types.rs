use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::budget::BudgetStatus;

/// Task type.
///
/// Unrecognised strings survive a round trip through `Other` so the daemon
/// can report them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    Ping,
    FileChange,
    Reflect,
    FileDirective,
    Other(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Ping => "ping",
            TaskKind::FileChange => "file-change",
            TaskKind::Reflect => "reflect",
            TaskKind::FileDirective => "file-directive",
            TaskKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ping" => TaskKind::Ping,
            "file-change" => TaskKind::FileChange,
            "reflect" => TaskKind::Reflect,
            "file-directive" => TaskKind::FileDirective,
            _ => TaskKind::Other(s),
        }
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for TaskKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskKind::from(s.to_string()))
    }
}

/// A unit of work in `tasks/{id}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// New task with a fresh id of the form `{type}-{epoch ms}-{random}`
    pub fn new(kind: TaskKind, payload: Value, now: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}-{}", kind, now.timestamp_millis(), &suffix[..6]);
        Self {
            id,
            kind,
            payload,
            created_at: now,
        }
    }
}

/// Outcome of a task in `results/{taskId}.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn ok(task_id: &str, result: Value, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: true,
            result: Some(result),
            error: None,
            completed_at: now,
        }
    }

    pub fn failed(task_id: &str, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: false,
            result: None,
            error: Some(error.into()),
            completed_at: now,
        }
    }
}

/// Payload of a successful ping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResult {
    pub pong: bool,
    /// Daemon uptime in milliseconds
    pub uptime: u64,
    pub message: String,
}

impl PingResult {
    pub fn new(uptime: u64) -> Self {
        Self {
            pong: true,
            uptime,
            message: "Daemon is alive!".to_string(),
        }
    }
}

/// Budget figures embedded in the status file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub is_paused: bool,
}

impl From<&BudgetStatus> for BudgetSnapshot {
    fn from(status: &BudgetStatus) -> Self {
        Self {
            used: status.used,
            limit: status.limit,
            remaining: status.remaining,
            is_paused: status.is_paused,
        }
    }
}

/// Contents of `daemon.status`, rewritten on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Milliseconds since `started_at`
    pub uptime: u64,
    #[serde(default)]
    pub watching: Vec<String>,
    pub tasks_processed: u64,
    #[serde(default)]
    pub token_budget: Option<BudgetSnapshot>,
}
