use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::persist::{load_json, save_json, LoadResultExt};

/// Length of one budget window in milliseconds
pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// History entries carried over when the hour rolls over
pub const MAX_HISTORY: usize = 100;

/// Entries reported as recent operations in [`BudgetStatus`]
const RECENT_OPERATIONS: usize = 5;

/// One recorded LLM operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub tokens_used: u64,
    pub model: String,
}

/// Persisted budget ledger (`token-budget.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBudget {
    pub hourly_limit: u64,
    pub current_hour_usage: u64,
    pub hour_started_at: DateTime<Utc>,
    /// Chronological, oldest first
    #[serde(default)]
    pub history: Vec<UsageEntry>,
    #[serde(default)]
    pub is_paused: bool,
}

impl TokenBudget {
    /// Empty budget whose window starts at `now`
    pub fn fresh(hourly_limit: u64, now: DateTime<Utc>) -> Self {
        Self {
            hourly_limit,
            current_hour_usage: 0,
            hour_started_at: now,
            history: Vec::new(),
            is_paused: false,
        }
    }

    /// Whether the window started at least an hour before `now`
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.hour_started_at).num_milliseconds() >= HOUR_MS
    }

    /// Start a new window at `now`, keeping the tail of the history
    fn roll_over(&mut self, now: DateTime<Utc>) {
        let keep_from = self.history.len().saturating_sub(MAX_HISTORY);
        let history = self.history.split_off(keep_from);
        *self = Self {
            history,
            ..Self::fresh(self.hourly_limit, now)
        };
    }
}

/// Budget summary for status output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub is_paused: bool,
    pub hour_started_at: DateTime<Utc>,
    pub recent_operations: Vec<UsageEntry>,
}

/// File-backed token budget.
///
/// Every public entry point first reloads the ledger from disk, so a pause
/// or resume from another process takes effect on the next check, and then
/// checks whether the hour has rolled over; there is no background timer.
/// Nothing is locked, so two processes recording usage at once can lose an
/// update. Amounts are estimates anyway.
pub struct TokenBudgetStore {
    path: PathBuf,
    hourly_limit: u64,
    budget: TokenBudget,
    clock: SharedClock,
}

impl TokenBudgetStore {
    /// Open the budget at `path`.
    ///
    /// A missing or corrupt file starts a fresh budget. The configured
    /// `hourly_limit` replaces whatever limit was persisted.
    pub fn open(path: impl Into<PathBuf>, hourly_limit: u64, clock: SharedClock) -> Self {
        let path = path.into();
        let now = clock.now();
        let budget = match load_json::<TokenBudget>(&path).fail_open() {
            Some(mut budget) => {
                budget.hourly_limit = hourly_limit;
                budget
            }
            None => TokenBudget::fresh(hourly_limit, now),
        };

        let mut store = Self {
            path,
            hourly_limit,
            budget,
            clock,
        };
        store.maybe_reset_hour();
        store
    }

    /// Re-read the persisted ledger, then roll the window over if due.
    ///
    /// A missing or corrupt file keeps the in-memory copy.
    fn refresh(&mut self) {
        if let Some(mut budget) = load_json::<TokenBudget>(&self.path).fail_open() {
            budget.hourly_limit = self.hourly_limit;
            self.budget = budget;
        }
        self.maybe_reset_hour();
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured hourly limit
    pub fn hourly_limit(&self) -> u64 {
        self.hourly_limit
    }

    /// Current ledger as held in memory
    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Whether `estimated_tokens` fits in what is left of this hour
    pub fn can_spend(&mut self, estimated_tokens: u64) -> bool {
        self.refresh();
        !self.budget.is_paused
            && self.budget.current_hour_usage.saturating_add(estimated_tokens) <= self.hourly_limit
    }

    /// Whether this hour's usage has reached the limit
    pub fn is_over_budget(&mut self) -> bool {
        self.refresh();
        self.budget.current_hour_usage >= self.hourly_limit
    }

    /// Whether automatic work is paused
    pub fn is_paused(&mut self) -> bool {
        self.refresh();
        self.budget.is_paused
    }

    /// Record tokens spent by an operation and persist the ledger.
    ///
    /// Pauses the budget once usage reaches the limit.
    pub fn record_usage(&mut self, operation: &str, tokens_used: u64, model: &str) -> Result<()> {
        self.refresh();

        self.budget.history.push(UsageEntry {
            timestamp: self.clock.now(),
            operation: operation.to_string(),
            tokens_used,
            model: model.to_string(),
        });
        self.budget.current_hour_usage = self.budget.current_hour_usage.saturating_add(tokens_used);

        if self.budget.current_hour_usage >= self.hourly_limit && !self.budget.is_paused {
            self.budget.is_paused = true;
            tracing::warn!(
                "Token budget exceeded ({}/{}). Operations paused.",
                self.budget.current_hour_usage,
                self.hourly_limit
            );
        }

        self.save()
    }

    /// Manually pause automatic work
    pub fn pause(&mut self) -> Result<()> {
        self.refresh();
        self.budget.is_paused = true;
        tracing::info!("Token budget paused");
        self.save()
    }

    /// Resume automatic work; usage is left untouched
    pub fn resume(&mut self) -> Result<()> {
        self.refresh();
        self.budget.is_paused = false;
        tracing::info!("Token budget resumed");
        self.save()
    }

    /// Summary of the current window
    pub fn status(&mut self) -> BudgetStatus {
        self.refresh();
        let recent_from = self.budget.history.len().saturating_sub(RECENT_OPERATIONS);
        BudgetStatus {
            used: self.budget.current_hour_usage,
            limit: self.hourly_limit,
            remaining: self.hourly_limit.saturating_sub(self.budget.current_hour_usage),
            is_paused: self.budget.is_paused,
            hour_started_at: self.budget.hour_started_at,
            recent_operations: self.budget.history[recent_from..].to_vec(),
        }
    }

    /// Roll the window over if an hour has passed. Returns true on reset.
    fn maybe_reset_hour(&mut self) -> bool {
        let now = self.clock.now();
        if !self.budget.is_stale(now) {
            return false;
        }

        self.budget.roll_over(now);
        tracing::debug!("Token budget window rolled over");
        if let Err(e) = self.save() {
            tracing::warn!("Failed to persist rolled-over budget: {:#}", e);
        }
        true
    }

    fn save(&self) -> Result<()> {
        save_json(&self.path, &self.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
    }

    fn store_with(limit: u64) -> (tempfile::TempDir, ManualClock, TokenBudgetStore) {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(start());
        let store = TokenBudgetStore::open(
            dir.path().join("token-budget.json"),
            limit,
            clock.shared(),
        );
        (dir, clock, store)
    }

    #[test]
    fn test_usage_sums_and_pauses_at_limit() {
        let (_dir, _clock, mut store) = store_with(1000);

        store.record_usage("a", 300, "haiku").unwrap();
        store.record_usage("b", 300, "haiku").unwrap();
        assert_eq!(store.budget().current_hour_usage, 600);
        assert!(!store.budget().is_paused);

        store.record_usage("c", 399, "haiku").unwrap();
        assert!(!store.budget().is_paused);

        store.record_usage("d", 1, "haiku").unwrap();
        assert_eq!(store.budget().current_hour_usage, 1000);
        assert!(store.budget().is_paused);
    }

    #[test]
    fn test_can_spend_boundary() {
        let (_dir, _clock, mut store) = store_with(1000);

        store.record_usage("directive", 600, "haiku").unwrap();
        assert!(store.can_spend(400));
        assert!(!store.can_spend(401));

        store.record_usage("directive", 400, "haiku").unwrap();
        assert!(store.is_over_budget());
        assert!(store.is_paused());
        assert!(!store.can_spend(0));

        store.resume().unwrap();
        assert!(!store.is_paused());
        assert_eq!(store.budget().current_hour_usage, 1000);
        assert!(store.can_spend(0));
        assert!(!store.can_spend(1));
    }

    #[test]
    fn test_pause_blocks_spending_regardless_of_amount() {
        let (_dir, _clock, mut store) = store_with(1000);
        store.pause().unwrap();
        assert!(!store.can_spend(0));
        assert!(!store.can_spend(1));
        assert!(!store.is_over_budget());
    }

    #[test]
    fn test_rollover_resets_once_and_trims_history() {
        let (_dir, clock, mut store) = store_with(100_000);
        for i in 0..150 {
            store.record_usage(&format!("op-{}", i), 10, "haiku").unwrap();
        }
        store.pause().unwrap();

        clock.advance(Duration::milliseconds(HOUR_MS - 1));
        assert!(!store.can_spend(1));

        clock.advance(Duration::milliseconds(1));
        assert!(store.can_spend(1));
        let budget = store.budget().clone();
        assert_eq!(budget.current_hour_usage, 0);
        assert!(!budget.is_paused);
        assert_eq!(budget.hour_started_at, clock.now());
        assert_eq!(budget.history.len(), MAX_HISTORY);
        assert_eq!(budget.history[0].operation, "op-50");
        assert_eq!(budget.history[99].operation, "op-149");

        // A second call in the same window does not reset again
        store.record_usage("after", 5, "haiku").unwrap();
        assert!(store.can_spend(1));
        assert_eq!(store.budget().current_hour_usage, 5);
        assert_eq!(store.budget().history.len(), MAX_HISTORY + 1);
    }

    #[test]
    fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-budget.json");
        let clock = ManualClock::new(start());

        {
            let mut store = TokenBudgetStore::open(&path, 1000, clock.shared());
            store.record_usage("directive: rename", 250, "haiku").unwrap();
        }

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["currentHourUsage"], 250);
        assert_eq!(raw["history"][0]["tokensUsed"], 250);

        let mut reopened = TokenBudgetStore::open(&path, 2000, clock.shared());
        assert_eq!(reopened.budget().current_hour_usage, 250);
        assert_eq!(reopened.budget().hourly_limit, 2000);
        assert!(reopened.can_spend(1750));
    }

    #[test]
    fn test_stale_file_rolls_over_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-budget.json");
        let clock = ManualClock::new(start());

        {
            let mut store = TokenBudgetStore::open(&path, 1000, clock.shared());
            store.record_usage("old", 1000, "haiku").unwrap();
        }

        clock.advance(Duration::hours(2));
        let store = TokenBudgetStore::open(&path, 1000, clock.shared());
        assert_eq!(store.budget().current_hour_usage, 0);
        assert!(!store.budget().is_paused);
        assert_eq!(store.budget().history.len(), 1);
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-budget.json");
        std::fs::write(&path, "{\"hourlyLimit\": 10").unwrap();

        let clock = ManualClock::new(start());
        let mut store = TokenBudgetStore::open(&path, 1000, clock.shared());
        assert_eq!(store.budget().current_hour_usage, 0);
        assert!(store.can_spend(1000));
    }

    #[test]
    fn test_pause_from_another_store_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token-budget.json");
        let clock = ManualClock::new(start());

        let mut daemon = TokenBudgetStore::open(&path, 10_000, clock.shared());
        let mut cli = TokenBudgetStore::open(&path, 10_000, clock.shared());

        cli.pause().unwrap();
        assert!(!daemon.can_spend(2000));
        assert!(daemon.is_paused());

        daemon.record_usage("directive: rename", 500, "haiku").unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["isPaused"], true);
        assert_eq!(raw["currentHourUsage"], 500);

        cli.resume().unwrap();
        assert!(daemon.can_spend(2000));
        assert_eq!(cli.status().used, 500);
    }

    #[test]
    fn test_removed_file_keeps_in_memory_ledger() {
        let (dir, _clock, mut store) = store_with(1000);
        store.record_usage("a", 300, "haiku").unwrap();
        std::fs::remove_file(dir.path().join("token-budget.json")).unwrap();

        assert!(store.can_spend(700));
        assert!(!store.can_spend(701));
    }

    #[test]
    fn test_status_reports_remaining_and_recent() {
        let (_dir, _clock, mut store) = store_with(1000);
        for i in 0..7 {
            store.record_usage(&format!("op-{}", i), 100, "sonnet").unwrap();
        }
        store.record_usage("big", 900, "sonnet").unwrap();

        let status = store.status();
        assert_eq!(status.used, 1600);
        assert_eq!(status.remaining, 0);
        assert!(status.is_paused);
        assert_eq!(status.recent_operations.len(), 5);
        assert_eq!(status.recent_operations[4].operation, "big");
    }
}
