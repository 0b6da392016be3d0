//! Welcome banner display for chat sessions.

use console::style;

/// Print the welcome banner at the start of a chat.
///
/// `resumed` carries the title of a stored chat being continued.
pub fn print_welcome_banner(provider: &str, model: &str, resumed: Option<&str>) {
    println!();
    println!("  {}", style("parley").cyan().bold());
    println!();
    println!("  {}  {}", style("Provider:").bold(), style(provider).dim());
    println!("  {}     {}", style("Model:").bold(), style(model).dim());
    if let Some(title) = resumed {
        println!("  {}   {}", style("Resumed:").bold(), style(title).dim());
    }
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
