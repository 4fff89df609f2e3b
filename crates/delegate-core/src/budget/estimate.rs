use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rough size of an LLM operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSize {
    Small,
    Medium,
    Large,
}

impl fmt::Display for TaskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSize::Small => write!(f, "small"),
            TaskSize::Medium => write!(f, "medium"),
            TaskSize::Large => write!(f, "large"),
        }
    }
}

impl FromStr for TaskSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(TaskSize::Small),
            "medium" => Ok(TaskSize::Medium),
            "large" => Ok(TaskSize::Large),
            other => Err(format!("unknown task size: {}", other)),
        }
    }
}

/// Estimate used when the model/size pair is not in the table (haiku, medium)
pub const DEFAULT_ESTIMATE: u64 = 2_000;

/// Approximate token cost of one operation
///
/// Unknown models fall back to [`DEFAULT_ESTIMATE`].
pub fn estimate_tokens(model: &str, size: TaskSize) -> u64 {
    match (model, size) {
        ("haiku", TaskSize::Small) => 500,
        ("haiku", TaskSize::Medium) => 2_000,
        ("haiku", TaskSize::Large) => 5_000,
        ("sonnet", TaskSize::Small) => 1_000,
        ("sonnet", TaskSize::Medium) => 4_000,
        ("sonnet", TaskSize::Large) => 10_000,
        ("opus", TaskSize::Small) => 2_000,
        ("opus", TaskSize::Medium) => 8_000,
        ("opus", TaskSize::Large) => 20_000,
        _ => DEFAULT_ESTIMATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_estimates() {
        assert_eq!(estimate_tokens("haiku", TaskSize::Small), 500);
        assert_eq!(estimate_tokens("sonnet", TaskSize::Medium), 4_000);
        assert_eq!(estimate_tokens("opus", TaskSize::Large), 20_000);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        assert_eq!(estimate_tokens("gpt-9", TaskSize::Large), DEFAULT_ESTIMATE);
        assert_eq!(estimate_tokens("", TaskSize::Small), DEFAULT_ESTIMATE);
    }

    #[test]
    fn test_task_size_parse() {
        assert_eq!("Medium".parse::<TaskSize>().unwrap(), TaskSize::Medium);
        assert!("huge".parse::<TaskSize>().is_err());
        assert_eq!(TaskSize::Large.to_string(), "large");
    }
}
