//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing. Running `parley` without a
//! subcommand starts an interactive chat.

pub mod chat;
pub mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Terminal chat with rolling memory and budgeted context.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true, args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Bridge tracing spans to OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Data directory holding `config.toml`.
    #[arg(long, global = true, env = "PARLEY_HOME")]
    pub data_dir: Option<PathBuf>,

    /// Chat options used when no subcommand is given.
    #[command(flatten)]
    pub chat: ChatArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat session (default).
    Chat(ChatArgs),

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Per-session overrides for `parley chat`.
#[derive(clap::Args, Default)]
pub struct ChatArgs {
    /// Model to use for this session (overrides `[session].model`).
    #[arg(short, long, env = "PARLEY_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Token budget for the short-term window.
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Pending-token threshold that triggers compaction.
    #[arg(long)]
    pub compress_threshold: Option<usize>,

    /// Model used for summaries and titles.
    #[arg(long)]
    pub compress_model: Option<String>,

    /// Do not send the rolling summary with requests.
    #[arg(long)]
    pub no_memory: bool,

    /// Pin a system instruction ahead of every request.
    #[arg(long)]
    pub pin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_defaults_to_chat() {
        let cli = Cli::try_parse_from(["parley"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn bare_invocation_accepts_chat_options() {
        let cli = Cli::try_parse_from(["parley", "--model", "openai/gpt-4.1"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.chat.model.as_deref(), Some("openai/gpt-4.1"));
    }

    #[test]
    fn chat_overrides_parse() {
        let cli = Cli::try_parse_from([
            "parley",
            "chat",
            "--model",
            "openai/gpt-4o",
            "--max-tokens",
            "2000",
            "--no-memory",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Chat(args)) => {
                assert_eq!(args.model.as_deref(), Some("openai/gpt-4o"));
                assert_eq!(args.max_tokens, Some(2000));
                assert!(args.no_memory);
            }
            _ => panic!("expected chat subcommand"),
        }
    }
}
