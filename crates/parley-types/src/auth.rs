//! Authentication session and credential types.
//!
//! Secret material is wrapped in [`SecretString`] so it never appears in
//! `Debug` output or logs.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::chat::OwnerId;

/// Email/password pair submitted to the auth backend.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            email: self.email.clone(),
            password: reseal(&self.password),
        }
    }
}

/// A signed-in session issued by the auth backend.
#[derive(Debug)]
pub struct AuthSession {
    pub owner_id: OwnerId,
    pub email: Option<String>,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Whether the access token has passed its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Clone for AuthSession {
    fn clone(&self) -> Self {
        Self {
            owner_id: self.owner_id.clone(),
            email: self.email.clone(),
            access_token: reseal(&self.access_token),
            refresh_token: self.refresh_token.as_ref().map(reseal),
            expires_at: self.expires_at,
        }
    }
}

/// Whether biometric re-authentication can be and is being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricStatus {
    pub available: bool,
    pub enabled: bool,
}

fn reseal(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}
