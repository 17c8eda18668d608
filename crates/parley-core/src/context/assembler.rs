//! Builds the bounded message list sent to the model.
//!
//! Output order is fixed: system prompt, rolling summary, pinned context,
//! then the short-term window in chronological order.

use parley_types::chat::{Session, Turn};

use crate::memory::summary_turn;
use crate::token::estimate_turn;

use super::EngineContext;
use super::template::{TemplateVars, fill_template};

/// Knobs for one assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyOptions {
    /// Token budget for the short-term window.
    pub budget: usize,
    /// Maximum number of recent turns eligible for the window.
    pub max_lookback: usize,
    pub inject_system_prompt: bool,
    pub tool_augmentation: bool,
}

impl AssemblyOptions {
    pub fn for_session(session: &Session, ctx: &EngineContext) -> Self {
        Self {
            budget: session.config.max_tokens,
            max_lookback: session.config.history_message_count,
            inject_system_prompt: session.config.enable_inject_system_prompts,
            tool_augmentation: ctx.tools_enabled(),
        }
    }
}

/// What the assembler did, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub considered: usize,
    pub included: usize,
    pub skipped_errors: usize,
    pub window_tokens: usize,
    pub context_start: usize,
    pub summary_included: bool,
}

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub turns: Vec<Turn>,
    pub stats: AssemblyStats,
}

/// Whether the rolling summary is sent with the next request.
pub fn summary_is_sent(session: &Session) -> bool {
    session.config.send_memory
        && session.rolling_memory.has_summary()
        && session.rolling_memory.last_summarized_index > session.manual_clear_index
}

/// Index of the oldest turn the short-term window may reach.
pub fn context_start_index(session: &Session, max_lookback: usize) -> usize {
    let short_term_floor = session.turn_count().saturating_sub(max_lookback);
    let memory_start = if summary_is_sent(session) {
        session
            .rolling_memory
            .last_summarized_index
            .min(short_term_floor)
    } else {
        short_term_floor
    };
    session.manual_clear_index.max(memory_start)
}

fn system_prompt(session: &Session, options: &AssemblyOptions, ctx: &EngineContext) -> Option<Turn> {
    let mut prompt = String::new();
    if options.inject_system_prompt {
        let vars = TemplateVars::for_session(ctx, &session.config);
        prompt.push_str(&fill_template(&ctx.system_template, "", &vars));
    }
    if options.tool_augmentation {
        if let Some(preamble) = ctx.tool_preamble.as_deref() {
            prompt.push_str(preamble);
        }
    }
    (!prompt.is_empty()).then(|| Turn::system(prompt))
}

/// Assemble the outgoing message list for `session`.
///
/// The short-term window walks backward from the newest turn, skipping
/// errored turns. A turn is taken only while the running total stays within
/// `options.budget`; the newest eligible turn is always taken. Never
/// mutates the session.
pub fn assemble(session: &Session, options: &AssemblyOptions, ctx: &EngineContext) -> AssembledContext {
    let mut turns = Vec::new();
    let mut stats = AssemblyStats::default();

    if let Some(prompt) = system_prompt(session, options, ctx) {
        turns.push(prompt);
    }

    if summary_is_sent(session) {
        if let Some(summary) = summary_turn(&session.rolling_memory) {
            turns.push(summary);
            stats.summary_included = true;
        }
    }

    turns.extend(session.pinned_context.iter().cloned());

    let context_start = context_start_index(session, options.max_lookback);
    stats.context_start = context_start;

    let mut window: Vec<&Turn> = Vec::new();
    for turn in session.turns.iter().skip(context_start).rev() {
        stats.considered += 1;
        if turn.is_error {
            stats.skipped_errors += 1;
            continue;
        }
        let cost = estimate_turn(turn);
        if !window.is_empty() && stats.window_tokens + cost > options.budget {
            break;
        }
        stats.window_tokens += cost;
        window.push(turn);
    }
    stats.included = window.len();

    turns.extend(window.into_iter().rev().cloned());

    AssembledContext { turns, stats }
}
