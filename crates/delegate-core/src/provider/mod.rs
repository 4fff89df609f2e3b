//! LLM runner.
//!
//! One trait and one implementation that shells out to the `claude` CLI.

mod claude;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

pub use claude::{model_token_estimate, ClaudeCli};

/// Per-call options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmOptions {
    pub model: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Result of one prompt. Failures are data, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// Token count, when the provider knows or estimates it
    pub tokens_used: Option<u64>,
}

impl LlmOutcome {
    pub fn succeeded(output: impl Into<String>, tokens_used: Option<u64>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            tokens_used,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
            tokens_used: None,
        }
    }
}

/// Something that can answer a prompt
pub trait LlmProvider: Send + Sync + 'static {
    fn run(
        &self,
        prompt: &str,
        options: &LlmOptions,
    ) -> impl Future<Output = LlmOutcome> + Send;
}
