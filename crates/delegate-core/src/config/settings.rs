use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::persist::{load_json, LoadError};

/// Workspace settings, read from `config.json` in the state directory.
///
/// Every field has a serde default, so a user file only needs the keys it
/// overrides and missing nested keys keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Daemon behaviour
    #[serde(default)]
    pub daemon: DaemonSettings,

    /// File watching
    #[serde(default)]
    pub watch: WatchSettings,
}

/// Daemon settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// LLM provider name (currently only "claude")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Custom command to use instead of "claude"
    #[serde(default)]
    pub custom_command: Option<String>,

    /// Minutes without activity before the tracker goes idle
    #[serde(default = "default_idle_timeout", alias = "plan_timeout_minutes")]
    pub idle_timeout_minutes: u64,

    /// Token budget per rolling hour
    #[serde(default = "default_token_budget")]
    pub token_budget_per_hour: u64,

    /// Model used for directives
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for each LLM CLI call in seconds
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    /// Task queue polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Status snapshot refresh interval in milliseconds
    #[serde(default = "default_status_interval")]
    pub status_interval_ms: u64,

    /// Idle check interval in seconds
    #[serde(default = "default_idle_check_interval")]
    pub idle_check_secs: u64,

    /// Automatic planning when the user goes idle
    #[serde(default)]
    pub auto_plan: AutoPlanSettings,
}

fn default_provider() -> String {
    "claude".to_string()
}

fn default_idle_timeout() -> u64 {
    5
}

fn default_token_budget() -> u64 {
    10_000
}

fn default_model() -> String {
    "haiku".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    500
}

fn default_status_interval() -> u64 {
    5_000
}

fn default_idle_check_interval() -> u64 {
    30
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            custom_command: None,
            idle_timeout_minutes: default_idle_timeout(),
            token_budget_per_hour: default_token_budget(),
            model: default_model(),
            llm_timeout_secs: default_llm_timeout(),
            poll_interval_ms: default_poll_interval(),
            status_interval_ms: default_status_interval(),
            idle_check_secs: default_idle_check_interval(),
            auto_plan: AutoPlanSettings::default(),
        }
    }
}

/// Auto-plan settings (opt-in)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoPlanSettings {
    /// Request a planning session when the user goes idle
    #[serde(default)]
    pub enabled: bool,

    /// Model suggested for the planning session
    #[serde(default = "default_model")]
    pub model: String,

    /// Iteration cap suggested for the planning session
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Optional focus passed along with the request
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for AutoPlanSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            max_iterations: default_max_iterations(),
            prompt: None,
        }
    }
}

/// Watch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Glob patterns (relative to the workspace) of files to watch
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    /// Directory names to ignore anywhere in the tree
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Quiet period before a changed file is reported, in milliseconds
    #[serde(default = "default_stability")]
    pub stability_ms: u64,
}

fn default_patterns() -> Vec<String> {
    ["**/*.ts", "**/*.tsx", "**/*.js", "**/*.jsx"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ignore() -> Vec<String> {
    ["node_modules", "dist", ".git", ".delegate"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_stability() -> u64 {
    300
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            ignore: default_ignore(),
            stability_ms: default_stability(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults.
    ///
    /// A missing file is the normal case. An unparsable file is logged and
    /// ignored so a typo in the config never keeps the daemon down.
    pub fn load(path: &Path) -> Self {
        match load_json::<Settings>(path) {
            Ok(settings) => settings,
            Err(LoadError::NotFound { .. }) => Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Validate and normalize settings values
    ///
    /// Zero intervals and limits are raised to 1 so timers never spin and
    /// the budget never divides the hour into nothing.
    pub fn validate(&mut self) {
        let daemon = &mut self.daemon;
        daemon.idle_timeout_minutes = daemon.idle_timeout_minutes.max(1);
        daemon.token_budget_per_hour = daemon.token_budget_per_hour.max(1);
        daemon.llm_timeout_secs = daemon.llm_timeout_secs.max(1);
        daemon.poll_interval_ms = daemon.poll_interval_ms.max(1);
        daemon.status_interval_ms = daemon.status_interval_ms.max(1);
        daemon.idle_check_secs = daemon.idle_check_secs.max(1);
        daemon.auto_plan.max_iterations = daemon.auto_plan.max_iterations.max(1);
    }
}
