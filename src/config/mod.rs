mod cli;

pub use cli::{BudgetAction, Command, Config, HookCommand};
