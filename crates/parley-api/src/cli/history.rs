//! `parley history` commands: list, search, show, and delete stored chats.

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use uuid::Uuid;

use parley_types::chat::{ChatRecord, MessageRole};

use crate::state::AppState;

/// List the signed-in user's chats, most recently updated first.
pub async fn list_chats(state: &AppState, search: Option<&str>, json: bool) -> Result<()> {
    let owner = state.owner()?;
    let chats = match search {
        Some(query) => state.history.search(Some(&owner), query).await?,
        None => state.history.list(Some(&owner)).await?,
    };

    if json {
        let rows: Vec<_> = chats
            .iter()
            .map(|chat| {
                serde_json::json!({
                    "id": chat.id,
                    "title": chat.title,
                    "turns": chat.messages.len(),
                    "created_at": chat.created_at,
                    "updated_at": chat.updated_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if chats.is_empty() {
        println!();
        match search {
            Some(query) => println!(
                "  {} No chats match '{}'.",
                style("i").blue().bold(),
                style(query).yellow()
            ),
            None => println!(
                "  {} No chats yet. Start one with: {}",
                style("i").blue().bold(),
                style("parley chat").yellow()
            ),
        }
        println!();
        return Ok(());
    }

    let now = Utc::now();
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Title").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Turns").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for chat in &chats {
        table.add_row(vec![
            Cell::new(&chat.title).fg(Color::Cyan),
            Cell::new(chat.id).fg(Color::DarkGrey),
            Cell::new(chat.messages.len()),
            Cell::new(format_relative_time(&chat.updated_at, now)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} {} chat(s). Continue one with: {}",
        style("i").blue().bold(),
        chats.len(),
        style("parley chat --resume <ID>").yellow()
    );
    println!();

    Ok(())
}

/// Print every turn of one chat.
pub async fn show_chat(state: &AppState, id: &Uuid, json: bool) -> Result<()> {
    let owner = state.owner()?;
    let chat = state
        .history
        .get(Some(&owner), id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("chat {id} not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
        return Ok(());
    }

    print!("{}", render_transcript(&chat));
    Ok(())
}

/// Delete one chat, confirming first unless `force` or `json`.
pub async fn delete_chat(state: &AppState, id: &Uuid, force: bool, json: bool) -> Result<()> {
    let owner = state.owner()?;
    let chat = state
        .history
        .get(Some(&owner), id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("chat {id} not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete chat '{}'?",
                style(&chat.title).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.history.delete(Some(&owner), id).await?;

    if json {
        println!("{}", serde_json::json!({"deleted": true, "id": id}));
    } else {
        println!(
            "  {} Chat '{}' deleted.",
            style("✓").red().bold(),
            chat.title
        );
    }

    Ok(())
}

fn render_transcript(chat: &ChatRecord) -> String {
    let mut out = format!(
        "\n  {}\n  {}\n\n",
        style(&chat.title).cyan().bold(),
        style(format!(
            "{}  created {}  updated {}",
            chat.id,
            chat.created_at.format("%Y-%m-%d %H:%M"),
            chat.updated_at.format("%Y-%m-%d %H:%M")
        ))
        .dim()
    );

    for turn in &chat.messages {
        let label = match turn.role {
            MessageRole::User => style("You").green().bold(),
            MessageRole::Assistant => style("Assistant").cyan().bold(),
            MessageRole::System => style("System").dim(),
        };
        out.push_str(&format!("  {label}\n"));
        if let Some(reasoning) = &turn.reasoning {
            for line in reasoning.lines() {
                out.push_str(&format!("    {}\n", style(line).dim()));
            }
        }
        for line in turn.content.lines() {
            out.push_str(&format!("    {line}\n"));
        }
        if turn.incomplete {
            out.push_str(&format!("    {}\n", style("[reply incomplete]").yellow()));
        }
        out.push('\n');
    }
    out
}

fn format_relative_time(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - *dt;

    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{}m ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{}h ago", diff.num_hours())
    } else if diff.num_days() < 30 {
        format!("{}d ago", diff.num_days())
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}
