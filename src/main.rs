use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use delegate::client;
use delegate::config::{BudgetAction, Command, Config, HookCommand};
use delegate::hooks;
use delegate_core::budget::TokenBudgetStore;
use delegate_core::clock::system_clock;
use delegate_core::config::Settings;
use delegate_core::ipc::IpcDir;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Hooks never fail the agent's action
    if cli.is_hook() {
        if let Err(e) = run(cli).await {
            tracing::warn!("Hook failed: {:#}", e);
        }
        return Ok(());
    }

    run(cli).await
}

async fn run(cli: Config) -> Result<()> {
    let layout = cli.layout()?;

    // Load settings
    let mut settings = Settings::load(&layout.config_file());
    settings.validate();

    let clock = system_clock();

    match cli.command {
        Command::Daemon => delegate::daemon::run(layout, settings).await,
        Command::Ping { timeout_ms } => {
            let ipc = IpcDir::open(layout)?;
            let result = client::ping(&ipc, Duration::from_millis(timeout_ms), &clock).await?;
            print_json(&result)
        }
        Command::Submit { kind, payload } => {
            let ipc = IpcDir::open(layout)?;
            let task = client::submit(&ipc, &kind, payload.as_deref(), &clock)?;
            print_json(&task)
        }
        Command::Status => {
            let ipc = IpcDir::open(layout)?;
            print_json(&client::status(&ipc))
        }
        Command::Budget { action } => {
            layout.ensure()?;
            let mut store = TokenBudgetStore::open(
                layout.budget_file(),
                settings.daemon.token_budget_per_hour,
                clock,
            );
            let status = client::budget(&mut store, action.unwrap_or(BudgetAction::Show))?;
            print_json(&status)
        }
        Command::Hook { hook } => {
            let mut stdout = std::io::stdout().lock();
            match hook {
                HookCommand::SessionStart => hooks::session_start(&layout, &mut stdout),
                HookCommand::SessionEnd => hooks::session_end(&layout, &mut stdout),
                HookCommand::PromptSubmit => {
                    hooks::prompt_submit(&layout, &settings, clock, &mut stdout)
                }
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("delegate=debug,delegate_core=debug")
    } else {
        EnvFilter::new("delegate=info,delegate_core=info")
    };

    // stdout belongs to hook output and JSON results
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
