use std::process::Stdio;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::{LlmOptions, LlmOutcome, LlmProvider};

/// Rough per-call token cost used when the CLI does not report one
pub fn model_token_estimate(model: &str) -> u64 {
    match model {
        "sonnet" => 4000,
        "opus" => 8000,
        _ => 2000,
    }
}

/// Provider backed by `claude --print`
#[derive(Debug, Clone, Default)]
pub struct ClaudeCli {
    /// Custom command override (if set, used instead of "claude")
    custom_command: Option<String>,
}

impl ClaudeCli {
    pub fn new(custom_command: Option<String>) -> Self {
        Self { custom_command }
    }

    fn command(&self) -> &str {
        self.custom_command.as_deref().unwrap_or("claude")
    }
}

impl LlmProvider for ClaudeCli {
    async fn run(&self, prompt: &str, options: &LlmOptions) -> LlmOutcome {
        let command = self.command();
        tracing::info!("Running {} with model: {}", command, options.model);

        let child = tokio::process::Command::new(command)
            .args(["--print", "--model", &options.model, prompt])
            .current_dir(&options.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return LlmOutcome::failed("", format!("Failed to spawn {}: {}", command, e)),
        };
        let pid = child.id();

        let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return LlmOutcome::failed("", format!("Process error: {}", e)),
            Err(_) => {
                // The wait future is gone but the process is not
                if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
                    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                        tracing::debug!("Failed to terminate timed out process {}: {}", pid, e);
                    }
                }
                return LlmOutcome::failed("", "Process timed out");
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return LlmOutcome::succeeded(stdout, Some(model_token_estimate(&options.model)));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let error = if stderr.is_empty() {
            match output.status.code() {
                Some(code) => format!("Process exited with code {}", code),
                None => "Process terminated by signal".to_string(),
            }
        } else {
            stderr
        };
        LlmOutcome::failed(stdout, error)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-claude");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn options(dir: &Path, model: &str, timeout: Duration) -> LlmOptions {
        LlmOptions {
            model: model.to_string(),
            working_dir: dir.to_path_buf(),
            timeout,
        }
    }

    #[test]
    fn test_model_token_estimate() {
        assert_eq!(model_token_estimate("haiku"), 2000);
        assert_eq!(model_token_estimate("sonnet"), 4000);
        assert_eq!(model_token_estimate("opus"), 8000);
        assert_eq!(model_token_estimate("gpt-5"), 2000);
    }

    #[tokio::test]
    async fn test_success_passes_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let cli = ClaudeCli::new(Some(script(dir.path(), r#"echo "$@""#)));

        let outcome = cli
            .run("say hi", &options(dir.path(), "sonnet", Duration::from_secs(10)))
            .await;
        assert_eq!(
            outcome,
            LlmOutcome::succeeded("--print --model sonnet say hi", Some(4000))
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = ClaudeCli::new(Some(script(dir.path(), "echo partial; echo boom >&2; exit 3")));

        let outcome = cli
            .run("x", &options(dir.path(), "haiku", Duration::from_secs(10)))
            .await;
        assert_eq!(outcome, LlmOutcome::failed("partial", "boom"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = ClaudeCli::new(Some(script(dir.path(), "exit 2")));

        let outcome = cli
            .run("x", &options(dir.path(), "haiku", Duration::from_secs(10)))
            .await;
        assert_eq!(outcome.error.as_deref(), Some("Process exited with code 2"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cli = ClaudeCli::new(Some(script(dir.path(), "exec sleep 30")));

        let outcome = cli
            .run("x", &options(dir.path(), "haiku", Duration::from_millis(200)))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Process timed out"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-binary").to_string_lossy().into_owned();
        let cli = ClaudeCli::new(Some(missing));

        let outcome = cli
            .run("x", &options(dir.path(), "haiku", Duration::from_secs(1)))
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Failed to spawn"));
    }
}
