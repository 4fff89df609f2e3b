use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::layout::StateLayout;
use crate::persist::{load_integer, load_json, save_text, LoadResultExt};

const MINUTE_MS: i64 = 60_000;

/// What distinguishes one tracker variant from another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleTrackerSpec {
    /// Label used in logs and events ("idle", "dream", "plan")
    pub label: String,
    /// Minutes without activity before going idle
    pub timeout_minutes: u64,
    /// Override flag file name under the state directory
    pub override_file: String,
}

impl IdleTrackerSpec {
    pub fn new(label: &str, timeout_minutes: u64, override_file: &str) -> Self {
        Self {
            label: label.to_string(),
            timeout_minutes,
            override_file: override_file.to_string(),
        }
    }

    /// Plain idle tracking, overridden by `idle.state`
    pub fn idle(timeout_minutes: u64) -> Self {
        Self::new("idle", timeout_minutes, "idle.state")
    }

    /// Dream mode, overridden by `dream.state`
    pub fn dream(timeout_minutes: u64) -> Self {
        Self::new("dream", timeout_minutes, "dream.state")
    }

    /// Plan mode, overridden by `plan.state`
    pub fn plan(timeout_minutes: u64) -> Self {
        Self::new("plan", timeout_minutes, "plan.state")
    }
}

/// Tracker state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdleState {
    #[default]
    Active,
    Idle,
}

/// Edge emitted when the tracker changes state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// The user has been inactive for the timeout
    Started { label: String, idle_minutes: u64 },
    /// Activity was recorded while idle
    Ended { label: String },
}

/// Manual override file (`plan.state` etc.).
///
/// Only `active` is interpreted. The slash commands that write this file
/// store extra metadata, which is kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideState {
    #[serde(default)]
    pub active: bool,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Activity tracker backed by `last-activity.txt`
pub struct IdleTracker {
    spec: IdleTrackerSpec,
    activity_path: PathBuf,
    override_path: PathBuf,
    last_activity: DateTime<Utc>,
    state: IdleState,
    clock: SharedClock,
}

impl IdleTracker {
    /// Create a tracker, resuming from the persisted last-activity time if
    /// there is a readable one
    pub fn new(layout: &StateLayout, spec: IdleTrackerSpec, clock: SharedClock) -> Self {
        let activity_path = layout.activity_file();
        let override_path = layout.file(&spec.override_file);
        let last_activity = load_integer(&activity_path)
            .fail_open()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(|| clock.now());

        Self {
            spec,
            activity_path,
            override_path,
            last_activity,
            state: IdleState::Active,
            clock,
        }
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn timeout_minutes(&self) -> u64 {
        self.spec.timeout_minutes
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Record user activity and persist it.
    ///
    /// Returns [`IdleEvent::Ended`] when this ends an idle episode.
    pub fn record_activity(&mut self) -> Result<Option<IdleEvent>> {
        self.last_activity = self.clock.now();
        save_text(
            &self.activity_path,
            &self.last_activity.timestamp_millis().to_string(),
        )?;

        if self.state == IdleState::Idle {
            self.state = IdleState::Active;
            tracing::info!("[{}] Activity detected, leaving idle state", self.spec.label);
            return Ok(Some(IdleEvent::Ended {
                label: self.spec.label.clone(),
            }));
        }
        Ok(None)
    }

    /// Whether the timeout has elapsed since the last activity.
    ///
    /// Pure wall-clock comparison; does not change state.
    pub fn is_idle_elapsed(&self) -> bool {
        self.elapsed_ms() >= self.timeout_ms()
    }

    /// Periodic check. Returns [`IdleEvent::Started`] on the Active to Idle
    /// edge only.
    ///
    /// An active override file suppresses the transition: the user is
    /// already running the mode by hand.
    ///
    /// Activity written to `last-activity.txt` by another process (the
    /// prompt hook) is adopted first, which can end an idle episode; in that
    /// case [`IdleEvent::Ended`] is returned instead.
    pub fn check(&mut self) -> Option<IdleEvent> {
        if let Some(ended) = self.adopt_external_activity() {
            return Some(ended);
        }
        if self.state == IdleState::Idle || !self.is_idle_elapsed() {
            return None;
        }
        if self.is_override_active() {
            tracing::debug!("[{}] Idle timeout reached but override is active", self.spec.label);
            return None;
        }

        self.state = IdleState::Idle;
        tracing::info!(
            "[{}] No activity for {} minutes",
            self.spec.label,
            self.spec.timeout_minutes
        );
        Some(IdleEvent::Started {
            label: self.spec.label.clone(),
            idle_minutes: self.idle_minutes(),
        })
    }

    /// Override file contents, if present and parsable
    pub fn override_state(&self) -> Option<OverrideState> {
        load_json(&self.override_path).fail_open()
    }

    pub fn is_override_active(&self) -> bool {
        self.override_state().is_some_and(|s| s.active)
    }

    /// Whole minutes (rounded up) until the timeout; 0 once reached
    pub fn minutes_until_idle(&self) -> u64 {
        let remaining = self.timeout_ms() - self.elapsed_ms();
        if remaining <= 0 {
            0
        } else {
            ((remaining + MINUTE_MS - 1) / MINUTE_MS) as u64
        }
    }

    /// Whole minutes (rounded down) since the last activity
    pub fn idle_minutes(&self) -> u64 {
        (self.elapsed_ms() / MINUTE_MS) as u64
    }

    fn adopt_external_activity(&mut self) -> Option<IdleEvent> {
        let persisted = load_integer(&self.activity_path)
            .fail_open()
            .and_then(DateTime::from_timestamp_millis)?;
        if persisted <= self.last_activity {
            return None;
        }

        self.last_activity = persisted;
        if self.state == IdleState::Idle {
            self.state = IdleState::Active;
            tracing::info!("[{}] External activity detected, leaving idle state", self.spec.label);
            return Some(IdleEvent::Ended {
                label: self.spec.label.clone(),
            });
        }
        None
    }

    fn elapsed_ms(&self) -> i64 {
        (self.clock.now() - self.last_activity)
            .num_milliseconds()
            .max(0)
    }

    fn timeout_ms(&self) -> i64 {
        i64::try_from(self.spec.timeout_minutes)
            .unwrap_or(i64::MAX / MINUTE_MS)
            .saturating_mul(MINUTE_MS)
    }
}
