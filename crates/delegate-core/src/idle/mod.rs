//! Idle detection.
//!
//! One state machine serves the idle, dream, and plan variants; they differ
//! only in label, timeout, and the override file they consult.

mod tracker;

pub use tracker::{IdleEvent, IdleState, IdleTracker, IdleTrackerSpec, OverrideState};
