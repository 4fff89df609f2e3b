use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use delegate_core::layout::{resolve_workspace, StateLayout, DEFAULT_STATE_DIR};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Background daemon and hooks for the delegate coding-assistant plugin"
)]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Workspace root (defaults to $DELEGATE_WORKSPACE, then the current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// State directory name inside the workspace
    #[arg(long, global = true, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: String,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the daemon in the foreground
    Daemon,
    /// Ask the daemon for a pong and wait for it
    Ping {
        /// How long to wait for the answer
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Queue a task for the daemon
    Submit {
        /// Task type (ping, file-change, reflect, file-directive, ...)
        kind: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
    },
    /// Print daemon status and liveness as JSON
    Status,
    /// Show or control the hourly token budget
    Budget {
        #[command(subcommand)]
        action: Option<BudgetAction>,
    },
    /// Entry points for the agent's lifecycle hooks
    Hook {
        #[command(subcommand)]
        hook: HookCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAction {
    /// Print usage for the current hour
    Show,
    /// Stop spending until resumed or the hour rolls over
    Pause,
    /// Allow spending again
    Resume,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookCommand {
    /// Start the daemon unless one is already running
    SessionStart,
    /// Stop the daemon
    SessionEnd,
    /// Record activity and deliver any pending daemon request
    PromptSubmit,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// State layout for the selected workspace
    pub fn layout(&self) -> Result<StateLayout> {
        let workspace = resolve_workspace(self.workspace.as_deref())?;
        Ok(StateLayout::with_dir_name(workspace, &self.state_dir))
    }

    pub fn is_hook(&self) -> bool {
        matches!(self.command, Command::Hook { .. })
    }
}
