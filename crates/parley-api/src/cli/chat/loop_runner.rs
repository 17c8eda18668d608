//! Main chat loop orchestration.
//!
//! Creates a session, then reads input until EOF: slash commands map onto
//! engine operations, everything else is submitted as a user turn whose
//! reply is streamed from session snapshots until the exchange settles.

use std::io::Write;
use std::time::Instant;

use console::style;
use rustyline_async::SharedWriter;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use parley_core::UserInput;
use parley_core::exchange::ExchangeHandle;
use parley_core::memory::{CompactionOutcome, TitleOutcome};
use parley_core::token;
use parley_observe::genai_attrs;
use parley_types::chat::{DEFAULT_TOPIC, SessionConfig, Turn};
use parley_types::exchange::ExchangeState;

use crate::cli::ChatArgs;
use crate::state::AppState;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::{ChatRenderer, SnapshotPrinter};

/// Apply command-line overrides to the configured session defaults.
pub fn session_config(defaults: &SessionConfig, args: &ChatArgs) -> SessionConfig {
    let mut config = defaults.clone();
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(temperature) = args.temperature {
        config.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    if let Some(threshold) = args.compress_threshold {
        config.compress_message_length_threshold = threshold;
    }
    if let Some(model) = &args.compress_model {
        config.compress_model = Some(model.clone());
    }
    if args.no_memory {
        config.send_memory = false;
    }
    config
}

fn prompt_for(topic: &str) -> String {
    if topic == DEFAULT_TOPIC {
        format!("  {} ", style("You >").green().bold())
    } else {
        format!(
            "  {} {} ",
            style(format!("[{topic}]")).dim(),
            style("You >").green().bold()
        )
    }
}

/// Run the interactive chat loop.
pub async fn run_chat_loop(state: &AppState, args: ChatArgs) -> anyhow::Result<()> {
    let config = session_config(&state.config.session, &args);
    let session = state.engine.create_session(config).await?;
    let mut session_id = session.id;

    if let Some(pin) = &args.pin {
        state
            .engine
            .set_pinned_context(session_id, vec![Turn::system(pin.as_str())])
            .await?;
    }

    print_welcome_banner(
        &state.config.provider.name,
        &session.config.model,
        session.config.max_tokens,
        &session_id.to_string(),
    );

    let renderer = ChatRenderer::new();
    let mut topic = session.topic.clone();
    let (mut chat_input, mut out) = ChatInput::new(prompt_for(&topic))
        .map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    loop {
        // Titles arrive in the background; surface them between turns.
        if let Some(current) = state.engine.session(session_id) {
            if current.topic != topic {
                topic = current.topic.clone();
                let _ = writeln!(out, "  {} {}", style("Topic:").bold(), style(&topic).cyan());
                chat_input.update_prompt(&prompt_for(&topic));
            }
        }

        let text = match chat_input.read_line().await {
            InputEvent::Eof => {
                let _ = writeln!(out, "\n  {}", style("Session ended.").dim());
                break;
            }
            InputEvent::Interrupted => {
                let _ = writeln!(out, "  {}", style("Press Ctrl+D to exit, or keep chatting.").dim());
                continue;
            }
            InputEvent::Message(text) => text,
        };
        if text.is_empty() {
            continue;
        }

        let input = match commands::parse(&text) {
            None => UserInput::text(text),
            Some(ChatCommand::Help) => {
                commands::print_help();
                continue;
            }
            Some(ChatCommand::Exit) => {
                let _ = writeln!(out, "\n  {}", style("Session ended.").dim());
                break;
            }
            Some(ChatCommand::ClearScreen) => {
                chat_input.clear();
                continue;
            }
            Some(ChatCommand::ClearContext) => {
                state.engine.clear_context(session_id).await?;
                notice(&mut out, "Context cleared. Earlier turns will not be sent.");
                continue;
            }
            Some(ChatCommand::Reset) => {
                state.engine.reset_session(session_id).await?;
                notice(&mut out, "Session reset.");
                continue;
            }
            Some(ChatCommand::Fork) => {
                let forked = state.engine.fork_session(session_id).await?;
                session_id = forked.id;
                let short = session_id.to_string();
                notice(&mut out, &format!("Forked into session {}.", &short[..8]));
                continue;
            }
            Some(ChatCommand::Retitle) => {
                let outcome = state
                    .engine
                    .force_retitle(session_id)
                    .instrument(info_span!(
                        "cli.command",
                        gen_ai.operation.name = genai_attrs::OP_GENERATE_TITLE,
                        parley.session.id = %session_id,
                    ))
                    .await?;
                match outcome {
                    TitleOutcome::Titled(t) => notice(&mut out, &format!("Topic set to \"{t}\".")),
                    TitleOutcome::Unchanged => notice(&mut out, "The model kept the current topic."),
                    TitleOutcome::AlreadyRunning => notice(&mut out, "A title is already being derived."),
                    TitleOutcome::NotNeeded => notice(&mut out, "Nothing to title yet."),
                    TitleOutcome::Failed => warn_notice(&mut out, "Title request failed (see logs)."),
                }
                continue;
            }
            Some(ChatCommand::Compact) => {
                let outcome = state
                    .engine
                    .force_compaction(session_id)
                    .instrument(info_span!(
                        "cli.command",
                        gen_ai.operation.name = genai_attrs::OP_SUMMARIZE_CONTEXT,
                        parley.session.id = %session_id,
                    ))
                    .await?;
                match outcome {
                    CompactionOutcome::Committed {
                        last_summarized_index,
                    } => notice(
                        &mut out,
                        &format!("Summary updated through turn {last_summarized_index}."),
                    ),
                    CompactionOutcome::NotNeeded => notice(&mut out, "Nothing new to summarize."),
                    CompactionOutcome::AlreadyRunning => {
                        notice(&mut out, "A summary is already being generated.")
                    }
                    CompactionOutcome::Stale => {
                        notice(&mut out, "History changed while summarizing; summary discarded.")
                    }
                    CompactionOutcome::Failed => warn_notice(&mut out, "Summary request failed (see logs)."),
                }
                continue;
            }
            Some(ChatCommand::Pin(text)) => {
                let mut pinned = state
                    .engine
                    .session(session_id)
                    .map(|s| s.pinned_context.clone())
                    .unwrap_or_default();
                pinned.push(Turn::system(text));
                let count = pinned.len();
                state.engine.set_pinned_context(session_id, pinned).await?;
                notice(&mut out, &format!("{count} pinned instruction(s)."));
                continue;
            }
            Some(ChatCommand::Unpin) => {
                state.engine.set_pinned_context(session_id, Vec::new()).await?;
                notice(&mut out, "Pinned instructions removed.");
                continue;
            }
            Some(ChatCommand::Info) => {
                print_info(state, session_id);
                continue;
            }
            Some(ChatCommand::Summary) => {
                match state.engine.session(session_id) {
                    Some(s) if s.rolling_memory.has_summary() => {
                        println!();
                        println!("{}", renderer.render_final(&s.rolling_memory.summary));
                    }
                    _ => notice(&mut out, "No summary yet."),
                }
                continue;
            }
            Some(ChatCommand::Image { url, prompt }) => UserInput::text(prompt).with_attachments(vec![url]),
            Some(ChatCommand::Tool(result)) => UserInput::tool_reply(result),
            Some(ChatCommand::Unknown(cmd_name)) => {
                let _ = writeln!(
                    out,
                    "  {} Unknown command: {}. Type /help for available commands.",
                    style("?").yellow().bold(),
                    style(cmd_name).dim()
                );
                continue;
            }
        };

        let model = state
            .engine
            .session(session_id)
            .map(|s| s.config.model.clone())
            .unwrap_or_default();
        let started = Instant::now();
        let handle = state.engine.submit_user_turn(session_id, input).await?;
        let reply = stream_reply(state, &mut chat_input, &mut out, &renderer, handle)
            .instrument(info_span!(
                "cli.turn",
                gen_ai.operation.name = genai_attrs::OP_CHAT,
                parley.session.id = %session_id,
            ))
            .await?;

        match reply.state {
            ExchangeState::Completed => {
                let tokens = token::estimate(&reply.text) as u64;
                renderer.print_stats_footer(&mut out, tokens, started.elapsed().as_millis() as u64, &model);
            }
            ExchangeState::Aborted => {
                let _ = writeln!(out, "\n  {}", style("(stopped)").dim());
            }
            ExchangeState::Errored => {
                let _ = writeln!(
                    out,
                    "\n  {} {}",
                    style("!").red().bold(),
                    style("Type a message to retry, /exit to quit.").dim()
                );
            }
            ExchangeState::Pending | ExchangeState::Streaming => {
                warn!(state = %reply.state, "reply loop ended before the exchange settled");
            }
        }
        let _ = writeln!(out);
    }

    chat_input.flush();
    Ok(())
}

/// Final state and text of a streamed reply.
struct StreamedReply {
    state: ExchangeState,
    text: String,
}

/// Print the reply as it streams. Ctrl+C cancels the exchange.
async fn stream_reply(
    state: &AppState,
    chat_input: &mut ChatInput,
    out: &mut SharedWriter,
    renderer: &ChatRenderer,
    handle: ExchangeHandle,
) -> anyhow::Result<StreamedReply> {
    let key = handle.key();
    let mut sessions = state
        .engine
        .subscribe(key.session_id)
        .ok_or_else(|| anyhow::anyhow!("session {} is not open", key.session_id))?;
    let mut exchange = handle.watch();
    let mut printer = SnapshotPrinter::new();

    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_style(
        indicatif::ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let print_snapshot = |printer: &mut SnapshotPrinter, out: &mut SharedWriter, text: &str| {
        let was_empty = printer.is_empty();
        if let Some(chunk) = printer.advance(text) {
            if was_empty {
                spinner.finish_and_clear();
                let _ = write!(out, "\n  {} ", style("Assistant").cyan().bold());
            }
            renderer.print_streaming(out, &chunk);
        }
    };

    loop {
        tokio::select! {
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = sessions.borrow_and_update().clone();
                if let Some(turn) = snapshot.find_turn(key.turn_id) {
                    print_snapshot(&mut printer, out, turn.text());
                }
            }
            changed = exchange.changed() => {
                if changed.is_err() || exchange.borrow().is_terminal() {
                    break;
                }
            }
            event = chat_input.read_line() => match event {
                InputEvent::Interrupted | InputEvent::Eof => {
                    if !state.engine.cancel_exchange(key.session_id, key.turn_id) {
                        warn!(exchange = %key, "cancel requested but exchange already settled");
                    }
                }
                InputEvent::Message(_) => {
                    let _ = writeln!(out, "\n  {}", style("(still replying, Ctrl+C to stop)").dim());
                }
            }
        }
    }

    // The session publish precedes the terminal state; catch the tail.
    if let Some(snapshot) = state.engine.session(key.session_id) {
        if let Some(turn) = snapshot.find_turn(key.turn_id) {
            print_snapshot(&mut printer, out, turn.text());
        }
    }
    spinner.finish_and_clear();

    let final_state = *exchange.borrow();
    Ok(StreamedReply {
        state: final_state,
        text: printer.text().to_string(),
    })
}

fn notice(out: &mut SharedWriter, message: &str) {
    let _ = writeln!(out, "  {} {}", style("*").cyan().bold(), message);
}

fn warn_notice(out: &mut SharedWriter, message: &str) {
    let _ = writeln!(out, "  {} {}", style("!").yellow().bold(), message);
}

/// Print a table describing the session's memory state.
fn print_info(state: &AppState, session_id: Uuid) {
    use comfy_table::{Cell, ContentArrangement, Table, presets};

    let Some(session) = state.engine.session(session_id) else {
        println!("  Session {session_id} is not open.");
        return;
    };

    let pending = token::estimate_turns(
        session
            .turns
            .iter()
            .skip(session.rolling_memory.last_summarized_index.max(session.manual_clear_index)),
    );

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Field"), Cell::new("Value")]);
    let rows: Vec<(&str, String)> = vec![
        ("Session", session.id.to_string()),
        ("Topic", session.topic.clone()),
        ("Model", session.config.model.clone()),
        ("Summary model", session.config.summary_model().to_string()),
        ("Turns", session.turn_count().to_string()),
        ("Pinned", session.pinned_context.len().to_string()),
        ("Cleared before", session.manual_clear_index.to_string()),
        (
            "Summarized before",
            session.rolling_memory.last_summarized_index.to_string(),
        ),
        ("Summary", if session.rolling_memory.has_summary() { "yes" } else { "no" }.to_string()),
        (
            "Pending tokens",
            format!("{pending} / {}", session.config.compress_message_length_threshold),
        ),
        ("Reply tokens", session.stats.token_count.to_string()),
        ("Reply words", session.stats.word_count.to_string()),
        ("Stored sessions", state.store.len().to_string()),
    ];
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }

    println!();
    println!("{table}");
    println!();
}
