//! Local auth storage: session file plus OS keychain secrets.
//!
//! `{data_dir}/auth.json` holds who is signed in and the biometric
//! preference. Bearer tokens and the password used for biometric
//! re-authentication only ever go to the keychain.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use parley_core::auth::backend::AuthStorage;
use parley_types::auth::{AuthSession, Credentials};
use parley_types::chat::OwnerId;
use parley_types::error::AuthError;

use crate::keychain::{CREDENTIALS_ACCOUNT, KeychainStore, SESSION_TOKENS_ACCOUNT, SecretStore};

const AUTH_FILE: &str = "auth.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthFile {
    #[serde(default)]
    session: Option<StoredSession>,
    #[serde(default)]
    biometric_enabled: bool,
}

/// Non-secret half of a session, kept on disk.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    owner_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Secret half of a session, kept in the keychain.
#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn split_session(session: &AuthSession) -> (StoredSession, StoredTokens) {
    let stored = StoredSession {
        owner_id: session.owner_id.to_string(),
        email: session.email.clone(),
        expires_at: session.expires_at,
    };
    let tokens = StoredTokens {
        access_token: session.access_token.expose_secret().to_string(),
        refresh_token: session
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret().to_string()),
    };
    (stored, tokens)
}

fn join_session(stored: StoredSession, tokens: StoredTokens) -> AuthSession {
    AuthSession {
        owner_id: OwnerId(stored.owner_id),
        email: stored.email,
        access_token: SecretString::from(tokens.access_token),
        refresh_token: tokens.refresh_token.map(SecretString::from),
        expires_at: stored.expires_at,
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    email: String,
    password: String,
}

/// [`AuthStorage`] backed by the data directory and a [`SecretStore`].
pub struct LocalAuthStorage<K = KeychainStore> {
    path: PathBuf,
    keychain: K,
}

impl<K: SecretStore> LocalAuthStorage<K> {
    pub fn new(data_dir: &Path, keychain: K) -> Self {
        Self {
            path: data_dir.join(AUTH_FILE),
            keychain,
        }
    }

    fn read(&self) -> Result<AuthFile, AuthError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                AuthError::Storage(format!("failed to parse {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AuthFile::default()),
            Err(e) => Err(AuthError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, file: &AuthFile) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuthError::Storage(format!("failed to create data dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| AuthError::Storage(format!("failed to encode auth file: {e}")))?;

        // Write-then-rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                AuthError::Storage(format!("failed to write {}: {e}", self.path.display()))
            })
    }

    fn update(&self, f: impl FnOnce(&mut AuthFile)) -> Result<(), AuthError> {
        let mut file = self.read()?;
        f(&mut file);
        self.write(&file)
    }
}

fn keychain_err(e: parley_types::error::RepositoryError) -> AuthError {
    AuthError::Storage(e.to_string())
}

impl<K: SecretStore> AuthStorage for LocalAuthStorage<K> {
    /// A session whose tokens are missing from the keychain counts as
    /// signed out.
    fn load_session(&self) -> Result<Option<AuthSession>, AuthError> {
        let Some(stored) = self.read()?.session else {
            return Ok(None);
        };
        let Some(json) = self
            .keychain
            .get(SESSION_TOKENS_ACCOUNT)
            .map_err(keychain_err)?
        else {
            warn!(owner_id = %stored.owner_id, "session tokens missing from keychain");
            return Ok(None);
        };
        let tokens: StoredTokens = serde_json::from_str(&json)
            .map_err(|e| AuthError::Storage(format!("stored session tokens are corrupt: {e}")))?;
        Ok(Some(join_session(stored, tokens)))
    }

    fn save_session(&self, session: &AuthSession) -> Result<(), AuthError> {
        let (stored, tokens) = split_session(session);
        let json = serde_json::to_string(&tokens)
            .map_err(|e| AuthError::Storage(format!("failed to encode session tokens: {e}")))?;
        self.keychain
            .set(SESSION_TOKENS_ACCOUNT, &json)
            .map_err(keychain_err)?;
        self.update(|file| file.session = Some(stored))
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        self.update(|file| file.session = None)?;
        self.keychain
            .delete(SESSION_TOKENS_ACCOUNT)
            .map_err(keychain_err)
    }

    fn load_credentials(&self) -> Result<Option<Credentials>, AuthError> {
        let Some(json) = self.keychain.get(CREDENTIALS_ACCOUNT).map_err(keychain_err)? else {
            return Ok(None);
        };
        let stored: StoredCredentials = serde_json::from_str(&json)
            .map_err(|e| AuthError::Storage(format!("stored credentials are corrupt: {e}")))?;
        Ok(Some(Credentials::new(
            stored.email,
            SecretString::from(stored.password),
        )))
    }

    fn save_credentials(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let stored = StoredCredentials {
            email: credentials.email.clone(),
            password: credentials.password.expose_secret().to_string(),
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| AuthError::Storage(format!("failed to encode credentials: {e}")))?;
        self.keychain
            .set(CREDENTIALS_ACCOUNT, &json)
            .map_err(keychain_err)
    }

    fn clear_credentials(&self) -> Result<(), AuthError> {
        self.keychain
            .delete(CREDENTIALS_ACCOUNT)
            .map_err(keychain_err)
    }

    fn biometric_enabled(&self) -> Result<bool, AuthError> {
        Ok(self.read()?.biometric_enabled)
    }

    fn set_biometric_enabled(&self, enabled: bool) -> Result<(), AuthError> {
        self.update(|file| file.biometric_enabled = enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use parley_types::error::RepositoryError;
    use tempfile::TempDir;

    /// In-memory keychain; clones share entries.
    #[derive(Clone, Default)]
    struct MemorySecrets(Arc<Mutex<HashMap<String, String>>>);

    impl MemorySecrets {
        fn contains(&self, account: &str) -> bool {
            self.0.lock().unwrap().contains_key(account)
        }
    }

    impl SecretStore for MemorySecrets {
        fn get(&self, account: &str) -> Result<Option<String>, RepositoryError> {
            Ok(self.0.lock().unwrap().get(account).cloned())
        }

        fn set(&self, account: &str, value: &str) -> Result<(), RepositoryError> {
            self.0
                .lock()
                .unwrap()
                .insert(account.to_string(), value.to_string());
            Ok(())
        }

        fn delete(&self, account: &str) -> Result<(), RepositoryError> {
            self.0.lock().unwrap().remove(account);
            Ok(())
        }
    }

    fn storage(dir: &TempDir) -> LocalAuthStorage<MemorySecrets> {
        LocalAuthStorage::new(dir.path(), MemorySecrets::default())
    }

    fn auth_file(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join(AUTH_FILE)).unwrap()
    }

    fn session() -> AuthSession {
        AuthSession {
            owner_id: OwnerId::new("user-123"),
            email: Some("ada@example.com".to_string()),
            access_token: SecretString::from("jwt-token".to_string()),
            refresh_token: Some(SecretString::from("refresh".to_string())),
            expires_at: DateTime::from_timestamp(1_900_000_000, 0),
        }
    }

    #[test]
    fn missing_file_means_signed_out() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert!(storage.load_session().unwrap().is_none());
        assert!(!storage.biometric_enabled().unwrap());
    }

    #[test]
    fn session_round_trips_through_file_and_keychain() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.save_session(&session()).unwrap();
        let loaded = storage.load_session().unwrap().unwrap();

        assert_eq!(loaded.owner_id, OwnerId::new("user-123"));
        assert_eq!(loaded.access_token.expose_secret(), "jwt-token");
        assert_eq!(
            loaded.refresh_token.as_ref().map(|t| t.expose_secret()),
            Some("refresh")
        );
        assert_eq!(loaded.expires_at, session().expires_at);
    }

    #[test]
    fn biometric_flag_survives_sign_out() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        storage.save_session(&session()).unwrap();
        storage.set_biometric_enabled(true).unwrap();
        storage.clear_session().unwrap();

        assert!(storage.load_session().unwrap().is_none());
        assert!(storage.biometric_enabled().unwrap());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(AUTH_FILE), "{not json").unwrap();

        let err = storage(&dir).load_session().unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
    }

    #[test]
    fn secrets_never_written_to_file() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.save_session(&session()).unwrap();
        storage
            .save_credentials(&Credentials::new(
                "ada@example.com",
                SecretString::from("hunter2".to_string()),
            ))
            .unwrap();
        storage.set_biometric_enabled(true).unwrap();

        let content = auth_file(&dir);
        assert!(content.contains("user-123"));
        assert!(!content.contains("jwt-token"));
        assert!(!content.contains("refresh"));
        assert!(!content.contains("hunter2"));

        let credentials = storage.load_credentials().unwrap().unwrap();
        assert_eq!(credentials.password.expose_secret(), "hunter2");
    }

    #[test]
    fn sign_out_removes_tokens_from_keychain() {
        let dir = TempDir::new().unwrap();
        let secrets = MemorySecrets::default();
        let storage = LocalAuthStorage::new(dir.path(), secrets.clone());

        storage.save_session(&session()).unwrap();
        assert!(secrets.contains(SESSION_TOKENS_ACCOUNT));

        storage.clear_session().unwrap();
        assert!(!secrets.contains(SESSION_TOKENS_ACCOUNT));
    }

    #[test]
    fn session_without_keychain_tokens_is_signed_out() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(AUTH_FILE),
            r#"{"session":{"owner_id":"user-123","access_token":"old-plaintext"}}"#,
        )
        .unwrap();

        assert!(storage(&dir).load_session().unwrap().is_none());
    }
}
