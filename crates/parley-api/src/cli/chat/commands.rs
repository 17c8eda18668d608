//! Slash command parsing and help text for the chat loop.
//!
//! Commands start with `/` and map onto engine operations: context
//! clearing, reset, fork, pinning, forced title and compaction.

use console::style;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Exclude all turns so far from future requests.
    ClearContext,
    /// Clear the terminal screen.
    ClearScreen,
    /// Drop every turn and the rolling summary.
    Reset,
    /// Continue in a copy of this session.
    Fork,
    /// Re-derive the topic now.
    Retitle,
    /// Summarize pending history now.
    Compact,
    /// Pin a system instruction ahead of every request.
    Pin(String),
    /// Remove pinned instructions.
    Unpin,
    /// Send an image URL with an optional prompt.
    Image { url: String, prompt: String },
    /// Send text as a tool result (skips the input template).
    Tool(String),
    /// Show session details.
    Info,
    /// Show the rolling summary.
    Summary,
    /// Exit the chat session.
    Exit,
    /// Unknown or malformed command.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let parts: Vec<&str> = trimmed.splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let arg = parts
        .get(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match cmd.as_str() {
        "/help" | "/h" | "/?" => Some(ChatCommand::Help),
        "/clear" => Some(ChatCommand::ClearContext),
        "/cls" => Some(ChatCommand::ClearScreen),
        "/reset" => Some(ChatCommand::Reset),
        "/fork" => Some(ChatCommand::Fork),
        "/retitle" | "/title" => Some(ChatCommand::Retitle),
        "/compact" => Some(ChatCommand::Compact),
        "/pin" => match arg {
            Some(text) => Some(ChatCommand::Pin(text)),
            None => Some(ChatCommand::Unknown("/pin requires an instruction".to_string())),
        },
        "/unpin" => Some(ChatCommand::Unpin),
        "/image" | "/img" => match arg {
            Some(rest) => {
                let mut split = rest.splitn(2, ' ');
                let url = split.next().unwrap_or_default().to_string();
                let prompt = split.next().map(|s| s.trim().to_string()).unwrap_or_default();
                Some(ChatCommand::Image { url, prompt })
            }
            None => Some(ChatCommand::Unknown("/image requires a URL".to_string())),
        },
        "/tool" => match arg {
            Some(text) => Some(ChatCommand::Tool(text)),
            None => Some(ChatCommand::Unknown("/tool requires a result".to_string())),
        },
        "/info" => Some(ChatCommand::Info),
        "/summary" => Some(ChatCommand::Summary),
        "/exit" | "/quit" | "/q" => Some(ChatCommand::Exit),
        other => Some(ChatCommand::Unknown(other.to_string())),
    }
}

/// Print the help text listing all available commands.
pub fn print_help() {
    let rows = [
        ("/help", "Show this help message"),
        ("/clear", "Forget everything so far (history stays visible)"),
        ("/cls", "Clear the screen"),
        ("/reset", "Drop all turns and the summary"),
        ("/fork", "Continue in a copy of this session"),
        ("/retitle", "Derive a new topic now"),
        ("/compact", "Summarize pending history now"),
        ("/pin <text>", "Pin a system instruction"),
        ("/unpin", "Remove pinned instructions"),
        ("/image <url> [prompt]", "Send an image"),
        ("/tool <result>", "Send a tool result"),
        ("/info", "Show session details"),
        ("/summary", "Show the rolling summary"),
        ("/exit", "End the chat session"),
    ];

    println!();
    println!("  {}", style("Available commands:").bold());
    println!();
    for (cmd, desc) in rows {
        println!("  {:<24} {}", style(cmd).cyan(), desc);
    }
    println!();
    println!(
        "  {}",
        style("Ctrl+C stops a reply in progress, Ctrl+D exits").dim()
    );
    println!();
}
