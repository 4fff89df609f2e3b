//! The daemon orchestrator.
//!
//! [`Daemon`] owns the budget store, idle tracker, and IPC directory and
//! drives them from a single `select!` loop. Everything observable is also
//! published as a [`DaemonEvent`].

mod events;
mod runner;

pub use events::DaemonEvent;
pub use runner::{Daemon, DaemonDeps, DirectiveOutcome};
