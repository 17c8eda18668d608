//! Welcome banner display for chat sessions.

use console::style;

/// Print the welcome banner at the start of a chat session.
///
/// Shows the provider, model, budget, and a shortened session id.
pub fn print_welcome_banner(provider: &str, model: &str, max_tokens: usize, session_id: &str) {
    println!();
    println!("  {} {}", style("*").cyan().bold(), style("Parley").cyan().bold());
    println!("  {}", style(format!("via {provider}")).dim());
    println!();
    println!("  {}    {}", style("Model:").bold(), style(model).dim());
    println!(
        "  {}   {}",
        style("Budget:").bold(),
        style(format!("{max_tokens} tokens")).dim()
    );
    println!(
        "  {}  {}",
        style("Session:").bold(),
        style(&session_id[..8.min(session_id.len())]).dim()
    );
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+C to stop a reply, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
