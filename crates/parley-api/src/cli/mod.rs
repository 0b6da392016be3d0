//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod auth;
pub mod chat;
pub mod history;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

/// Chat with a language model from the terminal.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
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

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true, env = "PARLEY_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat.
    Chat {
        /// Continue a stored chat by ID.
        #[arg(long)]
        resume: Option<Uuid>,
    },

    /// Browse, search, and delete stored chats.
    History {
        #[command(subcommand)]
        action: HistoryCommand,
    },

    /// Sign up, sign in, and manage biometric sign in.
    Auth {
        #[command(subcommand)]
        action: AuthCommand,
    },

    /// Run the completion relay server.
    Serve {
        /// Host to bind to (defaults to `[relay] host`).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to `[relay] port`).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// List stored chats, most recently updated first.
    #[command(alias = "ls")]
    List {
        /// Only chats whose title contains this text (case-insensitive).
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Print one chat's turns.
    Show {
        id: Uuid,
    },

    /// Delete a stored chat.
    #[command(alias = "rm")]
    Delete {
        id: Uuid,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommand {
    /// Create an account.
    SignUp {
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign in with email and password.
    SignIn {
        #[arg(long)]
        email: Option<String>,

        /// Sign in with the stored credentials after an identity check.
        #[arg(long, conflicts_with = "email")]
        biometric: bool,
    },

    /// Sign out locally and on the server.
    SignOut,

    /// Show who is signed in.
    Status,

    /// Turn biometric sign in on or off.
    Biometric {
        #[command(subcommand)]
        action: BiometricAction,
    },
}

#[derive(Subcommand)]
pub enum BiometricAction {
    Enable,
    Disable,
}
