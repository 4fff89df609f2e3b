use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};

use super::events::{DaemonEvent, EVENT_CHANNEL_CAPACITY};
use crate::budget::{estimate_tokens, TaskSize, TokenBudgetStore};
use crate::clock::SharedClock;
use crate::config::DaemonSettings;
use crate::directive::{scan_file, FileDirective};
use crate::idle::{IdleEvent, IdleTracker};
use crate::ipc::{
    BudgetSnapshot, DaemonRequest, DaemonStatus, IpcDir, PingResult, RequestAction, Task,
    TaskKind, TaskResult,
};
use crate::provider::{LlmOptions, LlmOutcome, LlmProvider};
use crate::watcher::FileWatcher;

/// Everything the daemon needs, built by the hosting process
pub struct DaemonDeps<P> {
    pub settings: DaemonSettings,
    pub ipc: IpcDir,
    pub budget: TokenBudgetStore,
    pub tracker: IdleTracker,
    pub provider: P,
    pub clock: SharedClock,
    /// Include patterns reported in the status file
    pub watching: Vec<String>,
}

/// A provider call that has finished
#[derive(Debug)]
pub struct DirectiveOutcome {
    pub directive: FileDirective,
    pub estimated_tokens: u64,
    pub outcome: LlmOutcome,
}

type DirectiveKey = (PathBuf, String);

pub struct Daemon<P> {
    settings: DaemonSettings,
    ipc: IpcDir,
    budget: TokenBudgetStore,
    tracker: IdleTracker,
    provider: Arc<P>,
    clock: SharedClock,
    watching: Vec<String>,

    pid: u32,
    started_at: chrono::DateTime<chrono::Utc>,
    tasks_processed: u64,
    running: bool,
    /// A start-plan request was written during the current idle episode
    auto_plan_requested: bool,
    /// Provider calls in flight, so a file saved twice does not run the
    /// same instruction twice
    running_directives: HashMap<Id, DirectiveKey>,
    events: broadcast::Sender<DaemonEvent>,
}

impl<P: LlmProvider> Daemon<P> {
    pub fn new(deps: DaemonDeps<P>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let started_at = deps.clock.now();
        Self {
            settings: deps.settings,
            ipc: deps.ipc,
            budget: deps.budget,
            tracker: deps.tracker,
            provider: Arc::new(deps.provider),
            clock: deps.clock,
            watching: deps.watching,
            pid: std::process::id(),
            started_at,
            tasks_processed: 0,
            running: false,
            auto_plan_requested: false,
            running_directives: HashMap::new(),
            events,
        }
    }

    /// Subscribe to daemon events.
    ///
    /// If the receiver falls behind, older events are dropped (lagged).
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    pub fn ipc(&self) -> &IpcDir {
        &self.ipc
    }

    pub fn budget(&self) -> &TokenBudgetStore {
        &self.budget
    }

    pub fn tracker(&self) -> &IdleTracker {
        &self.tracker
    }

    pub fn tasks_processed(&self) -> u64 {
        self.tasks_processed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run until `shutdown` resolves, then stop.
    ///
    /// Signal handling belongs to the caller; `shutdown` is whatever future
    /// it wants to end the loop with.
    pub async fn run<F>(mut self, mut watcher: Option<FileWatcher>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        let result = self.event_loop(&mut watcher, shutdown).await;
        if let Some(watcher) = watcher.as_mut() {
            watcher.stop();
        }
        let stopped = self.stop();
        result.and(stopped)
    }

    async fn event_loop<F>(&mut self, watcher: &mut Option<FileWatcher>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut poll = ticker(Duration::from_millis(self.settings.poll_interval_ms));
        let mut status = ticker(Duration::from_millis(self.settings.status_interval_ms));
        let mut idle = ticker(Duration::from_secs(self.settings.idle_check_secs));
        let mut in_flight: JoinSet<DirectiveOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutting down...");
                    break;
                }
                _ = poll.tick() => {
                    self.poll_tasks()?;
                }
                _ = status.tick() => self.update_status()?,
                _ = idle.tick() => self.check_idle()?,
                Some(path) = next_change(watcher) => {
                    self.handle_file_change(&path, &mut in_flight)?;
                }
                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    self.finish_directive(joined)?;
                }
            }
        }

        if !in_flight.is_empty() {
            tracing::info!("Aborting {} in-flight directive(s)", in_flight.len());
            in_flight.shutdown().await;
        }
        self.running_directives.clear();
        Ok(())
    }

    /// Write the PID and an initial status. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.running = true;

        self.ipc.write_pid(self.pid)?;
        self.update_status()?;

        tracing::info!("Daemon started (PID: {})", self.pid);
        tracing::info!("Workspace: {:?}", self.ipc.layout().workspace());
        tracing::info!("IPC directory: {:?}", self.ipc.layout().root());
        tracing::info!(
            "[{}] Idle after {} minutes without activity",
            self.tracker.label(),
            self.tracker.timeout_minutes()
        );
        self.emit(DaemonEvent::Started { pid: self.pid });
        Ok(())
    }

    /// Clear the PID file if it is still ours. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.running_directives.clear();

        if self.ipc.read_pid().is_none_or(|pid| pid == self.pid) {
            self.ipc.clear_pid()?;
        }

        tracing::info!("Daemon stopped");
        self.emit(DaemonEvent::Stopped);
        Ok(())
    }

    /// Answer every queued task, oldest first. Returns how many were handled.
    pub fn poll_tasks(&mut self) -> Result<usize> {
        let tasks = self.ipc.pending_tasks()?;
        let count = tasks.len();

        for task in tasks {
            self.record_activity()?;

            let result = self.process_task(&task);
            self.ipc.write_result(&result)?;
            self.ipc.consume_task(&task.id)?;
            self.tasks_processed += 1;

            self.emit(DaemonEvent::TaskProcessed {
                task_id: task.id,
                kind: task.kind,
                success: result.success,
            });
            self.update_status()?;
        }
        Ok(count)
    }

    /// Compute the result for one task. Only `ping` is answered; every
    /// other type is reported back as unknown.
    pub fn process_task(&self, task: &Task) -> TaskResult {
        tracing::debug!("Processing: {} ({})", task.kind, task.id);
        let now = self.clock.now();

        match task.kind {
            TaskKind::Ping => match serde_json::to_value(PingResult::new(self.uptime_ms())) {
                Ok(pong) => TaskResult::ok(&task.id, pong, now),
                Err(e) => TaskResult::failed(&task.id, e.to_string(), now),
            },
            _ => TaskResult::failed(&task.id, format!("Unknown task type: {}", task.kind), now),
        }
    }

    pub fn update_status(&mut self) -> Result<()> {
        let budget = self.budget.status();
        let status = DaemonStatus {
            pid: self.pid,
            started_at: self.started_at,
            last_activity: self.tracker.last_activity(),
            uptime: self.uptime_ms(),
            watching: self.watching.clone(),
            tasks_processed: self.tasks_processed,
            token_budget: Some(BudgetSnapshot::from(&budget)),
        };
        self.ipc.write_status(&status)
    }

    /// Periodic idle check
    pub fn check_idle(&mut self) -> Result<()> {
        match self.tracker.check() {
            Some(IdleEvent::Started { idle_minutes, .. }) => self.handle_idle_start(idle_minutes),
            Some(IdleEvent::Ended { .. }) => self.handle_idle_end(),
            None => Ok(()),
        }
    }

    pub fn record_activity(&mut self) -> Result<()> {
        if let Some(IdleEvent::Ended { .. }) = self.tracker.record_activity()? {
            self.handle_idle_end()?;
        }
        Ok(())
    }

    fn handle_idle_start(&mut self, idle_minutes: u64) -> Result<()> {
        self.emit(DaemonEvent::IdleStarted { idle_minutes });

        let skip_reason = if self.budget.is_over_budget() {
            Some("token budget exceeded")
        } else if self.budget.is_paused() {
            Some("token budget paused")
        } else if !self.settings.auto_plan.enabled {
            Some("auto-plan disabled")
        } else {
            None
        };
        if let Some(reason) = skip_reason {
            tracing::info!("Idle detected, skipping auto-plan: {}", reason);
            self.emit(DaemonEvent::AutoPlanSkipped {
                reason: reason.to_string(),
            });
            return Ok(());
        }

        let request = DaemonRequest::start_plan(&self.settings.auto_plan, self.clock.now());
        self.ipc.write_request(&request)?;
        self.auto_plan_requested = true;
        tracing::info!(
            "Idle for {} minutes, auto-plan requested ({})",
            idle_minutes,
            request.id
        );
        self.emit(DaemonEvent::AutoPlanRequested {
            request_id: request.id,
        });
        Ok(())
    }

    fn handle_idle_end(&mut self) -> Result<()> {
        self.emit(DaemonEvent::IdleEnded);
        if !std::mem::take(&mut self.auto_plan_requested) {
            tracing::info!("Activity resumed");
            return Ok(());
        }

        // Never delivered: withdraw it rather than ask to stop something
        // that never started
        let undelivered = self
            .ipc
            .peek_request()
            .is_some_and(|r| r.action == RequestAction::StartPlan);
        if undelivered {
            self.ipc.take_request()?;
            tracing::info!("Activity resumed, auto-plan request withdrawn");
            return Ok(());
        }

        self.ipc
            .write_request(&DaemonRequest::stop_plan(self.clock.now()))?;
        tracing::info!("Activity resumed, plan stop requested");
        Ok(())
    }

    /// Scan a settled file and dispatch its directives into `in_flight`
    pub fn handle_file_change(
        &mut self,
        path: &Path,
        in_flight: &mut JoinSet<DirectiveOutcome>,
    ) -> Result<()> {
        tracing::debug!("File changed: {:?}", path);
        self.emit(DaemonEvent::FileChanged {
            path: path.to_path_buf(),
        });

        for directive in scan_file(path, self.clock.now()) {
            self.emit(DaemonEvent::DirectiveFound {
                directive: directive.clone(),
            });
            self.dispatch_directive(directive, in_flight)?;
        }
        Ok(())
    }

    fn dispatch_directive(
        &mut self,
        directive: FileDirective,
        in_flight: &mut JoinSet<DirectiveOutcome>,
    ) -> Result<()> {
        let key = (directive.file_path.clone(), directive.instruction.clone());
        if self.running_directives.values().any(|k| *k == key) {
            self.skip_directive(&directive, "already running");
            return Ok(());
        }

        let estimated_tokens = estimate_tokens(&self.settings.model, TaskSize::Medium);
        if !self.budget.can_spend(estimated_tokens) {
            self.skip_directive(&directive, "token budget exceeded");
            return Ok(());
        }

        self.record_activity()?;
        tracing::info!("Processing directive: {}", directive.instruction);

        let prompt = directive_prompt(&directive);
        let options = LlmOptions {
            model: self.settings.model.clone(),
            working_dir: self.ipc.layout().workspace().to_path_buf(),
            timeout: Duration::from_secs(self.settings.llm_timeout_secs),
        };
        let provider = Arc::clone(&self.provider);

        let handle = in_flight.spawn(async move {
            let outcome = provider.run(&prompt, &options).await;
            DirectiveOutcome {
                directive,
                estimated_tokens,
                outcome,
            }
        });
        self.running_directives.insert(handle.id(), key);
        Ok(())
    }

    fn skip_directive(&self, directive: &FileDirective, reason: &str) {
        tracing::info!("Skipping directive ({}): {}", reason, directive.instruction);
        self.emit(DaemonEvent::DirectiveSkipped {
            instruction: directive.instruction.clone(),
            reason: reason.to_string(),
        });
    }

    /// Charge a finished provider call to the budget
    pub fn finish_directive(
        &mut self,
        joined: Result<(Id, DirectiveOutcome), JoinError>,
    ) -> Result<()> {
        let (id, done) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                self.running_directives.remove(&e.id());
                if !e.is_cancelled() {
                    tracing::warn!("Directive task failed: {}", e);
                }
                return Ok(());
            }
        };
        self.running_directives.remove(&id);

        let DirectiveOutcome {
            directive,
            estimated_tokens,
            outcome,
        } = done;

        if !outcome.success {
            tracing::warn!(
                "Directive failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            self.emit(DaemonEvent::DirectiveCompleted {
                id: directive.id,
                success: false,
                tokens_used: 0,
            });
            return Ok(());
        }

        let tokens_used = outcome.tokens_used.unwrap_or(estimated_tokens);
        let operation = format!("directive: {}", truncate(&directive.instruction, 30));
        self.budget
            .record_usage(&operation, tokens_used, &self.settings.model)?;
        tracing::info!(
            "Directive completed: {}",
            truncate(&directive.instruction, 50)
        );
        self.emit(DaemonEvent::DirectiveCompleted {
            id: directive.id,
            success: true,
            tokens_used,
        });
        Ok(())
    }

    fn uptime_ms(&self) -> u64 {
        u64::try_from((self.clock.now() - self.started_at).num_milliseconds()).unwrap_or(0)
    }

    fn emit(&self, event: DaemonEvent) {
        let _ = self.events.send(event);
    }
}

fn directive_prompt(directive: &FileDirective) -> String {
    format!(
        "File: {}\nLine {}: {}\n\nInstruction: {}\n\n\
         Please complete this task. Be concise and focused on the specific instruction.",
        directive.file_path.display(),
        directive.line_number,
        directive.directive,
        directive.instruction
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_change(watcher: &mut Option<FileWatcher>) -> Option<PathBuf> {
    match watcher {
        Some(watcher) => watcher.next_change().await,
        None => std::future::pending().await,
    }
}
