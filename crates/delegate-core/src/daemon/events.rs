use std::path::PathBuf;

use crate::directive::FileDirective;
use crate::ipc::TaskKind;

/// Capacity of the broadcast channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the daemon as its state changes.
///
/// Consumers call [`super::Daemon::subscribe()`]. Sending never blocks and
/// is ignored when nobody listens.
#[derive(Debug, Clone, PartialEq)]
pub enum DaemonEvent {
    Started {
        pid: u32,
    },
    Stopped,

    /// A queued task was answered
    TaskProcessed {
        task_id: String,
        kind: TaskKind,
        success: bool,
    },

    IdleStarted {
        idle_minutes: u64,
    },
    IdleEnded,

    /// A watched file settled after a change
    FileChanged {
        path: PathBuf,
    },
    DirectiveFound {
        directive: FileDirective,
    },
    /// A directive was not sent to the provider
    DirectiveSkipped {
        instruction: String,
        reason: String,
    },
    DirectiveCompleted {
        id: String,
        success: bool,
        /// Tokens charged to the budget (0 on failure)
        tokens_used: u64,
    },

    AutoPlanSkipped {
        reason: String,
    },
    AutoPlanRequested {
        request_id: String,
    },
}
