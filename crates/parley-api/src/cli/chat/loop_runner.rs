//! Main chat loop orchestration.
//!
//! Resolves the owner and completion client, optionally resumes a stored
//! chat, then reads input until Ctrl+D or `/exit`. Each message runs one
//! exchange on the session controller while input keeps being read, so
//! Ctrl+C can stop a streaming reply. History writes are reported as they
//! confirm and awaited before exit.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline_async::SharedWriter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_core::chat::controller::SessionController;
use parley_core::chat::persist::PersistHandle;
use parley_core::llm::completion::ProviderCompletionClient;
use parley_infra::sqlite::chat_history::SqliteChatHistoryRepository;
use parley_types::chat::{CompletionDelta, MessageRole, Turn};
use parley_types::error::ChatError;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent, LineSource};
use crate::state::AppState;

type ChatController = SessionController<ProviderCompletionClient, SqliteChatHistoryRepository>;

/// How long to wait for queued history writes when the chat ends.
const SAVE_GRACE: Duration = Duration::from_secs(10);

/// Longest turn preview shown by `/history`.
const PREVIEW_CHARS: usize = 100;

/// Run the interactive chat loop.
pub async fn run_chat_loop(state: &AppState, resume: Option<Uuid>) -> anyhow::Result<()> {
    let owner = state.owner()?;
    let client = state.completion_client()?;
    let provider = client.provider_name().to_string();
    let model = client.settings().model.clone();
    let deadline = Duration::from_secs(state.config.completion.deadline_secs);

    let mut controller =
        SessionController::new(Arc::new(client), state.history.repo(), Some(owner.clone()))
            .with_deadline(deadline);

    let mut resumed_title = None;
    if let Some(id) = resume {
        let record = state
            .history
            .get(Some(&owner), &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chat {id} not found"))?;
        resumed_title = Some(record.title.clone());
        controller.resume(record);
    }

    print_welcome_banner(&provider, &model, resumed_title.as_deref());
    if !controller.store().is_empty() {
        print!("{}", format_turns(controller.store().turns()));
        println!();
    }

    let prompt = format!("{} ", style("You >").green().bold());
    let (mut chat_input, mut writer) = ChatInput::new(prompt)
        .map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    info!(%provider, %model, resumed = resume.is_some(), "chat started");
    let mut pending: Vec<PersistHandle> = Vec::new();

    loop {
        report_persistence(&mut pending, &mut writer);

        let text = match chat_input.read_line().await {
            InputEvent::Eof => break,
            InputEvent::Interrupted => {
                writeln!(
                    writer,
                    "  {}",
                    style("Press Ctrl+D to exit, or keep chatting.").dim()
                )?;
                continue;
            }
            InputEvent::Message(text) if text.is_empty() => continue,
            InputEvent::Message(text) => text,
        };

        if let Some(cmd) = commands::parse(&text) {
            match cmd {
                ChatCommand::Help => write!(writer, "{}", commands::help_text())?,
                ChatCommand::Clear => chat_input.clear(),
                ChatCommand::Exit => break,
                ChatCommand::New => {
                    controller.reset();
                    writeln!(
                        writer,
                        "\n  {} Started a new conversation.\n",
                        style("*").cyan().bold()
                    )?;
                }
                ChatCommand::History => {
                    if controller.store().is_empty() {
                        writeln!(writer, "  {}", style("No messages yet.").dim())?;
                    } else {
                        write!(writer, "\n{}\n", format_turns(controller.store().turns()))?;
                    }
                }
                ChatCommand::Title => {
                    controller.reconcile();
                    let title = controller
                        .store()
                        .title()
                        .unwrap_or("(set by your first message)");
                    let id = controller
                        .session_id()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "not saved yet".to_string());
                    writeln!(
                        writer,
                        "  {} {}",
                        style(title).bold(),
                        style(format!("[{id}]")).dim()
                    )?;
                }
                ChatCommand::Unknown(name) => {
                    writeln!(
                        writer,
                        "\n  {} Unknown command: {}. Type /help for available commands.\n",
                        style("?").yellow().bold(),
                        style(name).dim()
                    )?;
                }
            }
            continue;
        }

        let exit = run_exchange(&mut controller, &mut chat_input, &mut writer, &text, &mut pending)
            .await?;
        if exit {
            break;
        }
    }

    writeln!(writer, "\n  {}", style("Chat ended.").dim())?;
    drop(controller);
    wait_for_saves(pending).await;
    Ok(())
}

/// Run one exchange. Returns `true` when the user asked to exit mid-stream.
async fn run_exchange(
    controller: &mut ChatController,
    chat_input: &mut ChatInput,
    writer: &mut SharedWriter,
    text: &str,
    pending: &mut Vec<PersistHandle>,
) -> anyhow::Result<bool> {
    let spinner = thinking_spinner();
    let mut renderer = ReplyRenderer::new(writer.clone(), spinner.clone());
    let cancel = controller.cancellation();

    let send = controller.send(text, |delta, _store| renderer.on_delta(delta));
    let Watched {
        result,
        interrupted,
        exit,
    } = watch_input(send, &cancel, chat_input, writer).await?;
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            writeln!(writer, "\n  {} {e}\n", style("!").red().bold())?;
            return Ok(exit);
        }
    };
    writeln!(writer, "\n")?;

    match &outcome.error {
        None => {}
        Some(_) if interrupted => {
            writeln!(writer, "  {}\n", style("Stopped. The partial reply was kept.").dim())?;
        }
        Some(e) => {
            let hint = match e {
                ChatError::RequestMalformed(_) => "The request was rejected; try rephrasing.",
                _ => "Type a message to retry, /exit to quit.",
            };
            writeln!(writer, "  {} {e}", style("!").red().bold())?;
            writeln!(writer, "  {}\n", style(hint).dim())?;
        }
    }

    pending.push(outcome.persist);
    Ok(exit)
}

/// An exchange's result plus what the user did while it ran.
struct Watched<T> {
    result: T,
    interrupted: bool,
    exit: bool,
}

/// Drive `send` to completion while reading input. Ctrl+C cancels the
/// exchange; end of input cancels it and asks the chat to exit.
async fn watch_input<T>(
    send: impl Future<Output = T>,
    cancel: &CancellationToken,
    input: &mut impl LineSource,
    out: &mut impl Write,
) -> std::io::Result<Watched<T>> {
    tokio::pin!(send);
    let mut interrupted = false;
    let mut exit = false;

    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            event = input.read_line() => match event {
                InputEvent::Interrupted => {
                    interrupted = true;
                    cancel.cancel();
                }
                InputEvent::Eof => {
                    interrupted = true;
                    exit = true;
                    cancel.cancel();
                    // Input is closed; only the settling exchange is left.
                    break send.as_mut().await;
                }
                InputEvent::Message(_) => {
                    writeln!(
                        out,
                        "  {}",
                        style("A reply is still streaming; press Ctrl+C to stop it.").dim()
                    )?;
                }
            },
        }
    };

    Ok(Watched {
        result,
        interrupted,
        exit,
    })
}

/// Prints reply fragments as they arrive, reasoning dimmed above the answer.
struct ReplyRenderer<W: Write> {
    out: W,
    spinner: ProgressBar,
    section: Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Waiting,
    Reasoning,
    Content,
}

impl<W: Write> ReplyRenderer<W> {
    fn new(out: W, spinner: ProgressBar) -> Self {
        Self {
            out,
            spinner,
            section: Section::Waiting,
        }
    }

    fn on_delta(&mut self, delta: &CompletionDelta) {
        if let Some(reasoning) = delta.reasoning_delta.as_deref().filter(|r| !r.is_empty()) {
            if self.section == Section::Waiting {
                self.spinner.finish_and_clear();
                let _ = write!(self.out, "\n  {} ", style("thinking").dim().italic());
                self.section = Section::Reasoning;
            }
            let _ = write!(self.out, "{}", style(reasoning).dim());
        }

        if let Some(content) = delta.content_delta.as_deref().filter(|c| !c.is_empty()) {
            if self.section != Section::Content {
                self.spinner.finish_and_clear();
                let gap = if self.section == Section::Reasoning { "\n\n" } else { "\n" };
                let _ = write!(self.out, "{gap}  {} ", style("Assistant").cyan().bold());
                self.section = Section::Content;
            }
            let _ = write!(self.out, "{content}");
        }

        let _ = self.out.flush();
    }
}

fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Print failures of history writes that have confirmed since the last call.
fn report_persistence(pending: &mut Vec<PersistHandle>, out: &mut impl Write) {
    pending.retain_mut(|handle| match handle.try_result() {
        None => true,
        Some(Ok(record)) => {
            debug!(chat_id = %record.id, turns = record.messages.len(), "chat saved");
            false
        }
        Some(Err(e)) => {
            let _ = writeln!(
                out,
                "  {} Could not save this chat: {e}",
                style("!").yellow().bold()
            );
            false
        }
    });
}

async fn wait_for_saves(pending: Vec<PersistHandle>) {
    for handle in pending {
        match tokio::time::timeout(SAVE_GRACE, handle.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                eprintln!("  {} Could not save this chat: {e}", style("!").yellow().bold());
            }
            Err(_) => {
                warn!(grace_secs = SAVE_GRACE.as_secs(), "gave up waiting for chat to save");
            }
        }
    }
}

fn format_turns(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let label = match turn.role {
            MessageRole::User => style("You").green().bold(),
            MessageRole::Assistant => style("Assistant").cyan().bold(),
            MessageRole::System => style("System").dim(),
        };
        let mut line = preview(&turn.content, PREVIEW_CHARS);
        if turn.incomplete {
            line.push_str(" [incomplete]");
        }
        out.push_str(&format!("  {label} {line}\n"));
    }
    out
}

/// Flatten whitespace and cut to `max` characters.
fn preview(content: &str, max: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{cut}...")
}
