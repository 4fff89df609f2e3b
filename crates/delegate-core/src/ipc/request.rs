use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AutoPlanSettings;

/// What the daemon is asking the agent to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestAction {
    StartPlan,
    StopPlan,
}

/// One-shot request in `daemon-request.json`, consumed by the prompt hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonRequest {
    pub id: String,
    pub action: RequestAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, alias = "max_iterations", skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DaemonRequest {
    pub fn start_plan(settings: &AutoPlanSettings, now: DateTime<Utc>) -> Self {
        Self {
            id: request_id(now),
            action: RequestAction::StartPlan,
            model: Some(settings.model.clone()),
            max_iterations: Some(settings.max_iterations),
            prompt: settings.prompt.clone(),
            created_at: now,
        }
    }

    pub fn stop_plan(now: DateTime<Utc>) -> Self {
        Self {
            id: request_id(now),
            action: RequestAction::StopPlan,
            model: None,
            max_iterations: None,
            prompt: None,
            created_at: now,
        }
    }

    /// Text block the prompt hook injects into the conversation
    pub fn render_directive(&self) -> String {
        let body = match self.action {
            RequestAction::StartPlan => {
                let model = self.model.as_deref().unwrap_or("haiku");
                let max_iterations = self.max_iterations.unwrap_or(10);
                let prompt = self
                    .prompt
                    .as_deref()
                    .map(|p| format!(" \"{}\"", p))
                    .unwrap_or_default();
                format!(
                    "The daemon has detected you are idle and auto-plan is enabled.\n\
                     Please run: /dg:plan {}{}\n\
                     Limit to {} iterations, then stop.",
                    model, prompt, max_iterations
                )
            }
            RequestAction::StopPlan => "The daemon requests stopping plan mode.\n\
                 Please run: /dg:wake"
                .to_string(),
        };
        format!("<daemon-request>\n{}\n</daemon-request>", body)
    }
}

fn request_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("req-{}-{}", now.timestamp_millis(), &suffix[..6])
}
