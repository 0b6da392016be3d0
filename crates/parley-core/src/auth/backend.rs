//! Auth port definitions: the hosted auth service, local credential
//! storage, and the presence/biometric check used before re-issuing
//! stored credentials.

use parley_types::auth::{AuthSession, Credentials};
use parley_types::error::AuthError;

/// Hosted email/password auth service.
///
/// Implementations live in parley-infra (e.g., `GoTrueAuthBackend`).
pub trait AuthBackend: Send + Sync {
    /// Register a new account. Returns `None` when the service requires the
    /// email address to be confirmed before a session is issued.
    fn sign_up(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<Option<AuthSession>, AuthError>> + Send;

    /// Exchange email and password for a session.
    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl std::future::Future<Output = Result<AuthSession, AuthError>> + Send;

    /// Revoke a session on the server.
    fn sign_out(
        &self,
        session: &AuthSession,
    ) -> impl std::future::Future<Output = Result<(), AuthError>> + Send;
}

/// Local persistence for the signed-in session and biometric re-auth.
///
/// Credentials must go to secure storage (the OS keychain); the session and
/// the preference flag may live in plain app storage.
pub trait AuthStorage: Send + Sync {
    fn load_session(&self) -> Result<Option<AuthSession>, AuthError>;

    fn save_session(&self, session: &AuthSession) -> Result<(), AuthError>;

    fn clear_session(&self) -> Result<(), AuthError>;

    fn load_credentials(&self) -> Result<Option<Credentials>, AuthError>;

    fn save_credentials(&self, credentials: &Credentials) -> Result<(), AuthError>;

    fn clear_credentials(&self) -> Result<(), AuthError>;

    fn biometric_enabled(&self) -> Result<bool, AuthError>;

    fn set_biometric_enabled(&self, enabled: bool) -> Result<(), AuthError>;
}

/// Local identity check (fingerprint, face, or a presence prompt).
pub trait BiometricVerifier: Send + Sync {
    /// Whether the device can verify the user at all.
    fn is_available(&self) -> bool;

    /// Ask the user to verify. `Ok(false)` means the check was declined or failed.
    fn verify(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<bool, AuthError>> + Send;
}
