//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use parley_types::error::ChatError;
use parley_types::llm::LlmError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub struct AppError(pub ChatError);

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError(e)
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        AppError(e.into())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ChatError::RequestMalformed(_) => StatusCode::BAD_REQUEST,
            ChatError::AuthRequired => StatusCode::UNAUTHORIZED,
            ChatError::ExchangeInFlight => StatusCode::CONFLICT,
            ChatError::StreamAborted(_) => StatusCode::BAD_GATEWAY,
            ChatError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": self.0.code(),
                "message": self.0.to_string(),
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError(ChatError::RequestMalformed("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError(ChatError::AuthRequired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(LlmError::Stream("reset".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(LlmError::InvalidRequest("too long".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
