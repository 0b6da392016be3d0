//! Parley CLI and relay server entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the matching command handler or starts the relay server.

mod cli;
mod http;
mod state;

use std::net::SocketAddr;

use clap::Parser;
use clap_complete::generate;
use parley_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing, verbosity_filter};

use cli::{AuthCommand, BiometricAction, Cli, Commands, HistoryCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(verbosity_filter(cli.verbose, cli.quiet), format, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    let result = run(cli, state).await;

    shutdown_tracing();
    result
}

async fn run(cli: Cli, state: AppState) -> anyhow::Result<()> {
    match cli.command {
        Commands::Chat { resume } => {
            cli::chat::loop_runner::run_chat_loop(&state, resume).await?;
        }

        Commands::History { action } => match action {
            HistoryCommand::List { search } => {
                cli::history::list_chats(&state, search.as_deref(), cli.json).await?;
            }
            HistoryCommand::Show { id } => {
                cli::history::show_chat(&state, &id, cli.json).await?;
            }
            HistoryCommand::Delete { id, force } => {
                cli::history::delete_chat(&state, &id, force, cli.json).await?;
            }
        },

        Commands::Auth { action } => match action {
            AuthCommand::SignUp { email } => {
                cli::auth::sign_up(&state, email, cli.json).await?;
            }
            AuthCommand::SignIn { email, biometric } => {
                cli::auth::sign_in(&state, email, biometric, cli.json).await?;
            }
            AuthCommand::SignOut => {
                cli::auth::sign_out(&state, cli.json).await?;
            }
            AuthCommand::Status => {
                cli::auth::status(&state, cli.json)?;
            }
            AuthCommand::Biometric { action } => match action {
                BiometricAction::Enable => cli::auth::enable_biometric(&state, cli.json).await?,
                BiometricAction::Disable => cli::auth::disable_biometric(&state, cli.json)?,
            },
        },

        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| state.config.relay.host.clone());
            let port = port.unwrap_or(state.config.relay.port);
            let addr: SocketAddr = format!("{host}:{port}").parse()?;

            let router = http::router::build_router(state.relay_state()?);
            let listener = tokio::net::TcpListener::bind(addr).await?;

            if !cli.quiet {
                println!();
                println!(
                    "  {} relay listening on {}",
                    console::style("parley").cyan().bold(),
                    console::style(format!("http://{addr}")).bold()
                );
                println!(
                    "  {}",
                    console::style(format!(
                        "POST http://{addr}{}",
                        parley_infra::llm::relay::CHAT_PATH
                    ))
                    .dim()
                );
                println!();
            }
            tracing::info!(%addr, "relay server started");

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Completions { .. } => unreachable!("handled before state init"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
