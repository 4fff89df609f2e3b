//! Lifecycle hooks registered by the agent plugin.
//!
//! Hooks must be fast and must never fail the agent's action: errors are
//! logged to stderr and the hook exits cleanly. Anything written to the
//! output is shown to the agent.

mod prompt;
mod session;

pub use prompt::prompt_submit;
pub use session::{running_daemon, session_end, session_start};
