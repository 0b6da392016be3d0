//! Slash command parsing for the chat loop.
//!
//! Commands start with `/` and control the conversation rather than being
//! sent to the model.

use console::style;

/// Available slash commands in the chat loop.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Clear the terminal screen.
    Clear,
    /// Exit the chat.
    Exit,
    /// Start a new conversation.
    New,
    /// Show the turns of this conversation.
    History,
    /// Show the conversation title and id.
    Title,
    /// Unknown command.
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

    let cmd = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();

    match cmd.as_str() {
        "/help" | "/h" | "/?" => Some(ChatCommand::Help),
        "/clear" | "/cls" => Some(ChatCommand::Clear),
        "/exit" | "/quit" | "/q" => Some(ChatCommand::Exit),
        "/new" => Some(ChatCommand::New),
        "/history" => Some(ChatCommand::History),
        "/title" => Some(ChatCommand::Title),
        other => Some(ChatCommand::Unknown(other.to_string())),
    }
}

/// Help text listing all available commands.
pub fn help_text() -> String {
    let rows = [
        ("/help", "Show this help message"),
        ("/clear", "Clear the screen"),
        ("/exit", "End the chat"),
        ("/new", "Start a new conversation"),
        ("/history", "Show this conversation's turns"),
        ("/title", "Show the conversation title"),
    ];

    let mut text = format!("\n  {}\n\n", style("Available commands:").bold());
    for (name, description) in rows {
        text.push_str(&format!("  {:<10} {description}\n", style(name).cyan()));
    }
    text.push_str(&format!(
        "\n  {}\n",
        style("Ctrl+C stops a streaming reply, Ctrl+D exits").dim()
    ));
    text
}
