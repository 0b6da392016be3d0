//! AuthService -- sign-up, sign-in, sign-out, and biometric re-authentication.
//!
//! Biometric re-auth works by keeping the last password sign-in's
//! credentials in secure storage and replaying them after a successful
//! local identity check. Enabling it requires a signed-in session and a
//! passed check; disabling it wipes the stored credentials.

use parley_types::auth::{AuthSession, BiometricStatus, Credentials};
use parley_types::chat::OwnerId;
use parley_types::error::{AuthError, ChatError};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use super::backend::{AuthBackend, AuthStorage, BiometricVerifier};

const VERIFY_PROMPT: &str = "Verify your identity";

/// Owner of the persisted session, for callers that hold only the storage.
///
/// Any failure to read the session is treated as signed out.
pub fn resolve_owner<S: AuthStorage>(storage: &S) -> Result<OwnerId, ChatError> {
    match storage.load_session() {
        Ok(Some(session)) => Ok(session.owner_id),
        Ok(None) => Err(ChatError::AuthRequired),
        Err(e) => {
            warn!(error = %e, "could not read auth session");
            Err(ChatError::AuthRequired)
        }
    }
}

/// Orchestrates the auth backend, local storage, and identity verifier.
pub struct AuthService<B, S, V> {
    backend: B,
    storage: S,
    verifier: V,
}

impl<B, S, V> AuthService<B, S, V>
where
    B: AuthBackend,
    S: AuthStorage,
    V: BiometricVerifier,
{
    pub fn new(backend: B, storage: S, verifier: V) -> Self {
        Self {
            backend,
            storage,
            verifier,
        }
    }

    /// The persisted session, if signed in.
    pub fn current_session(&self) -> Result<Option<AuthSession>, AuthError> {
        self.storage.load_session()
    }

    /// Resolve the owner for chat operations.
    pub fn require_owner(&self) -> Result<OwnerId, ChatError> {
        resolve_owner(&self.storage)
    }

    /// Register an account; signs in immediately when the service allows it.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<Option<AuthSession>, AuthError> {
        validate(credentials)?;
        let session = self.backend.sign_up(credentials).await?;
        match &session {
            Some(session) => {
                self.storage.save_session(session)?;
                info!(owner = %session.owner_id, "signed up and signed in");
            }
            None => info!(email = %credentials.email, "signed up; email confirmation pending"),
        }
        Ok(session)
    }

    /// Sign in with email and password.
    ///
    /// When biometric re-auth is enabled the stored credentials are refreshed.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        validate(credentials)?;
        let session = self.backend.sign_in(credentials).await?;
        self.storage.save_session(&session)?;
        if self.storage.biometric_enabled()? {
            self.storage.save_credentials(credentials)?;
        }
        info!(owner = %session.owner_id, "signed in");
        Ok(session)
    }

    /// Sign out locally and on the server.
    ///
    /// The local session is cleared even when the server call fails; that
    /// failure is still returned. Biometric credentials are kept.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.storage.load_session()?.ok_or(AuthError::NotSignedIn)?;
        self.storage.clear_session()?;
        self.backend.sign_out(&session).await?;
        info!(owner = %session.owner_id, "signed out");
        Ok(())
    }

    pub fn biometric_status(&self) -> Result<BiometricStatus, AuthError> {
        Ok(BiometricStatus {
            available: self.verifier.is_available(),
            enabled: self.storage.biometric_enabled()?,
        })
    }

    /// Turn on biometric re-auth for the signed-in account.
    ///
    /// `credentials` must belong to the current session's account.
    pub async fn enable_biometric(&self, credentials: &Credentials) -> Result<(), AuthError> {
        validate(credentials)?;
        let session = self.storage.load_session()?.ok_or(AuthError::NotSignedIn)?;
        if let Some(email) = &session.email {
            if !email.eq_ignore_ascii_case(&credentials.email) {
                return Err(AuthError::InvalidCredentials);
            }
        }
        if !self.verifier.is_available() {
            return Err(AuthError::BiometricUnavailable);
        }
        if !self.verifier.verify(VERIFY_PROMPT).await? {
            return Err(AuthError::BiometricFailed);
        }

        self.storage.save_credentials(credentials)?;
        self.storage.set_biometric_enabled(true)?;
        info!(owner = %session.owner_id, "biometric sign in enabled");
        Ok(())
    }

    /// Turn off biometric re-auth and wipe stored credentials.
    pub fn disable_biometric(&self) -> Result<(), AuthError> {
        self.storage.clear_credentials()?;
        self.storage.set_biometric_enabled(false)?;
        info!("biometric sign in disabled");
        Ok(())
    }

    /// Sign in by replaying stored credentials after an identity check.
    pub async fn sign_in_with_biometric(&self) -> Result<AuthSession, AuthError> {
        if !self.storage.biometric_enabled()? || !self.verifier.is_available() {
            return Err(AuthError::BiometricUnavailable);
        }
        if !self.verifier.verify(VERIFY_PROMPT).await? {
            return Err(AuthError::BiometricFailed);
        }
        let credentials = self
            .storage
            .load_credentials()?
            .ok_or(AuthError::NoStoredCredentials)?;

        let session = self.backend.sign_in(&credentials).await?;
        self.storage.save_session(&session)?;
        info!(owner = %session.owner_id, "signed in with biometric");
        Ok(session)
    }
}

fn validate(credentials: &Credentials) -> Result<(), AuthError> {
    if credentials.email.trim().is_empty() || credentials.password.expose_secret().is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}
