//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, loads `config.toml`, wires the chat engine to the
//! configured transport, then dispatches to the requested command.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{ChatArgs, Cli, Commands};
use state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug",
        _ => "trace",
    };
    parley_observe::tracing_setup::init_tracing(cli.otel, filter)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    parley_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Shell completions don't need configuration
        Some(Commands::Completions { shell }) => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "parley", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Config) => {
            let app = AppConfig::load(cli.data_dir).await;
            cli::config::show_config(&app, cli.json)
        }
        Some(Commands::Chat(args)) => chat(AppConfig::load(cli.data_dir).await, args).await,
        None => chat(AppConfig::load(cli.data_dir).await, cli.chat).await,
    }
}

async fn chat(app: AppConfig, args: ChatArgs) -> anyhow::Result<()> {
    let state = AppState::init(app)?;
    cli::chat::loop_runner::run_chat_loop(&state, args).await
}
