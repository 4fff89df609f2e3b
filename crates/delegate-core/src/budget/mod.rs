//! Hourly token budget.
//!
//! Usage is tracked per rolling hour in `token-budget.json`. Reaching the
//! limit pauses automatic work until the hour rolls over or the user
//! resumes it.

mod estimate;
mod store;

pub use estimate::{estimate_tokens, TaskSize, DEFAULT_ESTIMATE};
pub use store::{
    BudgetStatus, TokenBudget, TokenBudgetStore, UsageEntry, HOUR_MS, MAX_HISTORY,
};
