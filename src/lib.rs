//! Command line front end for delegate: the daemon host, the client
//! commands, and the agent lifecycle hooks.

pub mod client;
pub mod config;
pub mod daemon;
pub mod hooks;
pub mod process;
