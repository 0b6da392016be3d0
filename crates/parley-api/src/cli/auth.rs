//! `parley auth` commands and the terminal identity check.

use anyhow::Result;
use chrono::{DateTime, Utc};
use console::style;
use dialoguer::{Confirm, Input, Password};
use secrecy::SecretString;

use parley_core::auth::backend::{AuthStorage, BiometricVerifier};
use parley_types::auth::{AuthSession, Credentials};
use parley_types::error::AuthError;

use crate::state::AppState;

/// Presence check for terminals without a biometric sensor: an explicit
/// confirmation typed by the person at the keyboard.
pub struct TerminalVerifier;

impl BiometricVerifier for TerminalVerifier {
    fn is_available(&self) -> bool {
        console::user_attended()
    }

    async fn verify(&self, prompt: &str) -> Result<bool, AuthError> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await
        .map_err(|e| AuthError::Backend(format!("identity check task failed: {e}")))?
        .map_err(|_| AuthError::BiometricUnavailable)
    }
}

fn prompt_email(email: Option<String>) -> Result<String> {
    match email {
        Some(email) => Ok(email),
        None => Ok(Input::<String>::new().with_prompt("Email").interact_text()?),
    }
}

fn prompt_password(confirm: bool) -> Result<SecretString> {
    let mut prompt = Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(SecretString::from(prompt.interact()?))
}

/// Create an account, signing in when the service issues a session at once.
pub async fn sign_up(state: &AppState, email: Option<String>, json: bool) -> Result<()> {
    let service = state.auth_service()?;
    let credentials = Credentials::new(prompt_email(email)?, prompt_password(true)?);

    let session = service.sign_up(&credentials).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "signed_in": session.is_some(),
                "owner_id": session.as_ref().map(|s| s.owner_id.as_str()),
            })
        );
        return Ok(());
    }

    match session {
        Some(session) => println!(
            "\n  {} Signed up and signed in as {}.\n",
            style("✓").green().bold(),
            style(display_name(&session)).cyan()
        ),
        None => println!(
            "\n  {} Account created. Confirm your email, then run {}.\n",
            style("i").blue().bold(),
            style("parley auth sign-in").yellow()
        ),
    }
    Ok(())
}

/// Sign in with email and password, or with stored credentials after an
/// identity check.
pub async fn sign_in(
    state: &AppState,
    email: Option<String>,
    biometric: bool,
    json: bool,
) -> Result<()> {
    let service = state.auth_service()?;

    let session = if biometric {
        service.sign_in_with_biometric().await?
    } else {
        let credentials = Credentials::new(prompt_email(email)?, prompt_password(false)?);
        service.sign_in(&credentials).await?
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "signed_in": true,
                "owner_id": session.owner_id.as_str(),
                "email": session.email,
            })
        );
    } else {
        println!(
            "\n  {} Signed in as {}.\n",
            style("✓").green().bold(),
            style(display_name(&session)).cyan()
        );
    }
    Ok(())
}

pub async fn sign_out(state: &AppState, json: bool) -> Result<()> {
    let service = state.auth_service()?;
    service.sign_out().await?;

    if json {
        println!("{}", serde_json::json!({ "signed_in": false }));
    } else {
        println!("\n  {} Signed out.\n", style("✓").green().bold());
    }
    Ok(())
}

/// Show the stored session and biometric preference. Works offline.
pub fn status(state: &AppState, json: bool) -> Result<()> {
    let session = state.auth_storage.load_session()?;
    let biometric_enabled = state.auth_storage.biometric_enabled()?;
    let biometric_available = TerminalVerifier.is_available();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "signed_in": session.is_some(),
                "owner_id": session.as_ref().map(|s| s.owner_id.as_str()),
                "email": session.as_ref().and_then(|s| s.email.as_deref()),
                "expires_at": session.as_ref().and_then(|s| s.expires_at),
                "biometric": {
                    "available": biometric_available,
                    "enabled": biometric_enabled,
                },
            })
        );
        return Ok(());
    }

    println!();
    match &session {
        Some(session) => println!(
            "  {}  {}",
            style("Signed in:").bold(),
            session_summary(session, Utc::now())
        ),
        None => println!(
            "  {}  {} (run {})",
            style("Signed in:").bold(),
            style("no").yellow(),
            style("parley auth sign-in").yellow()
        ),
    }
    println!(
        "  {}  {}",
        style("Biometric:").bold(),
        match (biometric_enabled, biometric_available) {
            (true, true) => style("enabled").green(),
            (true, false) => style("enabled (unavailable here)").yellow(),
            (false, _) => style("disabled").dim(),
        }
    );
    println!();
    Ok(())
}

/// Remember the current account's credentials for biometric sign in.
pub async fn enable_biometric(state: &AppState, json: bool) -> Result<()> {
    let service = state.auth_service()?;
    let session = service
        .current_session()?
        .ok_or(AuthError::NotSignedIn)?;

    let email = prompt_email(session.email.clone())?;
    println!(
        "  {}",
        style(format!("Enter the password for {email} to remember it.")).dim()
    );
    let credentials = Credentials::new(email, prompt_password(false)?);
    service.enable_biometric(&credentials).await?;

    if json {
        println!("{}", serde_json::json!({ "biometric": true }));
    } else {
        println!(
            "\n  {} Biometric sign in enabled. Use {}.\n",
            style("✓").green().bold(),
            style("parley auth sign-in --biometric").yellow()
        );
    }
    Ok(())
}

pub fn disable_biometric(state: &AppState, json: bool) -> Result<()> {
    let service = state.auth_service()?;
    service.disable_biometric()?;

    if json {
        println!("{}", serde_json::json!({ "biometric": false }));
    } else {
        println!(
            "\n  {} Biometric sign in disabled; stored credentials removed.\n",
            style("✓").green().bold()
        );
    }
    Ok(())
}

fn display_name(session: &AuthSession) -> &str {
    session
        .email
        .as_deref()
        .unwrap_or_else(|| session.owner_id.as_str())
}

fn session_summary(session: &AuthSession, now: DateTime<Utc>) -> String {
    let mut summary = display_name(session).to_string();
    if let Some(expires_at) = session.expires_at {
        if session.is_expired(now) {
            summary.push_str(" (token expired; sign in again)");
        } else {
            summary.push_str(&format!(
                " (token valid until {})",
                expires_at.format("%Y-%m-%d %H:%M UTC")
            ));
        }
    }
    summary
}
