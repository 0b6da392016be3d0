//! Hosted email/password auth over the GoTrue REST API (as served by Supabase).
//!
//! Endpoints used:
//! - `POST {url}/auth/v1/signup`
//! - `POST {url}/auth/v1/token?grant_type=password`
//! - `POST {url}/auth/v1/logout`
//!
//! Every request carries the project's public key in the `apikey` header.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use parley_core::auth::backend::AuthBackend;
use parley_types::auth::{AuthSession, Credentials};
use parley_types::chat::OwnerId;
use parley_types::config::AuthConfig;
use parley_types::error::AuthError;

/// [`AuthBackend`] talking to a GoTrue server.
///
/// Does NOT derive Debug: it holds the project key.
pub struct GoTrueAuthBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
}

#[derive(Serialize)]
struct PasswordBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Token response. Sign-up without auto-confirm returns a bare user instead,
/// which leaves every token field empty.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<GoTrueUser>,
}

/// Error bodies differ between GoTrue versions; accept both shapes.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl ErrorBody {
    fn message(&self) -> String {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

impl GoTrueAuthBackend {
    pub fn new(base_url: &str, anon_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }

    /// Build from `[auth]` config, reading the key from `anon_key_env`.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| AuthError::Backend("auth.url is not configured".to_string()))?;
        let key = std::env::var(&config.anon_key_env).map_err(|_| {
            AuthError::Backend(format!("{} is not set", config.anon_key_env))
        })?;
        Ok(Self::new(url, SecretString::from(key)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_password(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<TokenResponse, AuthError> {
        let body = PasswordBody {
            email: &credentials.email,
            password: credentials.password.expose_secret(),
        };

        let response = self
            .client
            .post(self.url(path))
            .header("apikey", self.anon_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Backend(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(map_error(status, &error_body));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("failed to parse auth response: {e}")))
    }
}

fn map_error(status: reqwest::StatusCode, body: &ErrorBody) -> AuthError {
    let code = body
        .error_code
        .as_deref()
        .or(body.error.as_deref())
        .unwrap_or("");
    let message = body.message();

    if code == "email_not_confirmed" || message.contains("Email not confirmed") {
        AuthError::EmailNotConfirmed
    } else if code == "invalid_credentials"
        || code == "invalid_grant"
        || message.contains("Invalid login credentials")
    {
        AuthError::InvalidCredentials
    } else {
        AuthError::Backend(format!("HTTP {status}: {message}"))
    }
}

/// Turn a token response into a session; `None` when no token was issued.
fn into_session(response: TokenResponse, email: &str) -> Result<Option<AuthSession>, AuthError> {
    let Some(access_token) = response.access_token else {
        return Ok(None);
    };
    let user = response
        .user
        .ok_or_else(|| AuthError::Backend("auth response is missing the user".to_string()))?;

    let expires_at = match (response.expires_at, response.expires_in) {
        (Some(at), _) => DateTime::from_timestamp(at, 0),
        (None, Some(secs)) => Some(Utc::now() + Duration::seconds(secs)),
        (None, None) => None,
    };

    Ok(Some(AuthSession {
        owner_id: OwnerId(user.id),
        email: user.email.or_else(|| Some(email.to_string())),
        access_token: SecretString::from(access_token),
        refresh_token: response.refresh_token.map(SecretString::from),
        expires_at,
    }))
}

impl AuthBackend for GoTrueAuthBackend {
    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<AuthSession>, AuthError> {
        let response = self.post_password("/auth/v1/signup", credentials).await?;
        into_session(response, &credentials.email)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        let response = self
            .post_password("/auth/v1/token?grant_type=password", credentials)
            .await?;
        into_session(response, &credentials.email)?
            .ok_or_else(|| AuthError::Backend("sign-in returned no session".to_string()))
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url("/auth/v1/logout"))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| AuthError::Backend(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        // An already-expired token is as good as signed out.
        if status.is_success() || status.as_u16() == 401 {
            return Ok(());
        }
        let error_body: ErrorBody = response.json().await.unwrap_or_default();
        Err(map_error(status, &error_body))
    }
}
