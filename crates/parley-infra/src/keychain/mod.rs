//! OS keychain adapter.
//!
//! Uses the `keyring` crate to store secrets via:
//! - macOS Keychain
//! - Linux Secret Service (GNOME Keyring, KDE Wallet)
//! - Windows Credential Manager
//!
//! Parley keeps provider API keys and the remembered sign-in credentials
//! for biometric re-authentication here, never on disk.

use parley_types::error::RepositoryError;

/// Service name all Parley entries are filed under.
pub const SERVICE_NAME: &str = "parley";

/// Keychain account holding the remembered sign-in credentials.
pub const CREDENTIALS_ACCOUNT: &str = "auth/credentials";

/// Keychain account holding the signed-in session's bearer tokens.
pub const SESSION_TOKENS_ACCOUNT: &str = "auth/session";

/// Named secret storage. [`KeychainStore`] is the production backend.
pub trait SecretStore: Send + Sync {
    /// Read a secret. `Ok(None)` when nothing is stored under `account`.
    fn get(&self, account: &str) -> Result<Option<String>, RepositoryError>;

    fn set(&self, account: &str, value: &str) -> Result<(), RepositoryError>;

    /// Remove a secret. Removing an absent entry is not an error.
    fn delete(&self, account: &str) -> Result<(), RepositoryError>;
}

/// Thin wrapper over `keyring::Entry` scoped to one service name.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Custom service name (useful for testing).
    pub fn with_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, RepositoryError> {
        keyring::Entry::new(&self.service_name, account)
            .map_err(|e| RepositoryError::Query(format!("keychain entry error: {e}")))
    }
}

impl SecretStore for KeychainStore {
    fn get(&self, account: &str) -> Result<Option<String>, RepositoryError> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(RepositoryError::Query(format!("keychain get error: {e}"))),
        }
    }

    fn set(&self, account: &str, value: &str) -> Result<(), RepositoryError> {
        self.entry(account)?
            .set_password(value)
            .map_err(|e| RepositoryError::Query(format!("keychain set error: {e}")))
    }

    fn delete(&self, account: &str) -> Result<(), RepositoryError> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(RepositoryError::Query(format!(
                "keychain delete error: {e}"
            ))),
        }
    }
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new()
    }
}
