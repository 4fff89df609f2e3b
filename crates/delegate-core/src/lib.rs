//! Core library for delegate.
//!
//! Everything the background daemon needs lives here: the hourly token
//! budget, the named idle tracker, the `@delegate:` directive scanner, the
//! file watcher, the file-based task queue, the LLM CLI runner, and the
//! [`daemon::Daemon`] that drives them from a single event loop.

pub mod budget;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod directive;
pub mod idle;
pub mod ipc;
pub mod layout;
pub mod persist;
pub mod provider;
pub mod watcher;
