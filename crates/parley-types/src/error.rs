use thiserror::Error;

use crate::llm::LlmError;

/// Errors surfaced to the interactive layer by chat operations.
///
/// Nothing here is retried automatically; retry is a user action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("request malformed: {0}")]
    RequestMalformed(String),

    #[error("stream aborted: {0}")]
    StreamAborted(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("sign in required")]
    AuthRequired,

    #[error("a reply is still streaming")]
    ExchangeInFlight,
}

impl ChatError {
    /// Stable machine-readable code for API envelopes and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::RequestMalformed(_) => "REQUEST_MALFORMED",
            ChatError::StreamAborted(_) => "STREAM_ABORTED",
            ChatError::Persistence(_) => "PERSISTENCE_ERROR",
            ChatError::AuthRequired => "AUTH_REQUIRED",
            ChatError::ExchangeInFlight => "EXCHANGE_IN_FLIGHT",
        }
    }
}

impl From<RepositoryError> for ChatError {
    fn from(err: RepositoryError) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidRequest(_) | LlmError::Deserialization(_) => {
                ChatError::RequestMalformed(err.to_string())
            }
            other => ChatError::StreamAborted(other.to_string()),
        }
    }
}

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from sign-in, sign-up, and biometric re-authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("check your email to confirm the account before signing in")]
    EmailNotConfirmed,

    #[error("biometric authentication is not available")]
    BiometricUnavailable,

    #[error("biometric authentication failed")]
    BiometricFailed,

    #[error("no stored credentials found")]
    NoStoredCredentials,

    #[error("not signed in")]
    NotSignedIn,

    #[error("auth backend error: {0}")]
    Backend(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_repository_error_maps_to_persistence() {
        let err: ChatError = RepositoryError::NotFound.into();
        assert_eq!(err, ChatError::Persistence("entity not found".to_string()));
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_llm_error_mapping() {
        let malformed: ChatError = LlmError::InvalidRequest("bad role".to_string()).into();
        assert!(matches!(malformed, ChatError::RequestMalformed(_)));

        let aborted: ChatError = LlmError::Stream("connection reset".to_string()).into();
        assert_eq!(
            aborted,
            ChatError::StreamAborted("stream error: connection reset".to_string())
        );

        let timeout: ChatError = LlmError::Timeout(5).into();
        assert!(matches!(timeout, ChatError::StreamAborted(_)));
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::NoStoredCredentials.to_string(),
            "no stored credentials found"
        );
    }
}
