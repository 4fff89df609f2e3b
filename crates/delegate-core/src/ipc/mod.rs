//! File-based IPC between the daemon and its clients.
//!
//! Clients drop task files into `tasks/`, the daemon answers in `results/`
//! and keeps `daemon.status` and `daemon.pid` current. Requests for the
//! prompt hook travel through `daemon-request.json`.

mod queue;
mod request;
mod types;

pub use queue::{IpcDir, IpcError};
pub use request::{DaemonRequest, RequestAction};
pub use types::{BudgetSnapshot, DaemonStatus, PingResult, Task, TaskKind, TaskResult};
