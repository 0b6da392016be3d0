//! Wire format of the relay completion endpoint (`POST /api/chat`).
//!
//! Shared by the `parley serve` handler and the relay provider so both
//! sides agree on field and event names.

use serde::{Deserialize, Serialize};

use crate::llm::Message;

/// SSE event carrying visible text.
pub const EVENT_TEXT_DELTA: &str = "text_delta";
/// SSE event carrying reasoning text.
pub const EVENT_REASONING_DELTA: &str = "reasoning_delta";
/// SSE event reporting an upstream failure; ends the stream.
pub const EVENT_ERROR: &str = "error";
/// SSE event marking a clean end of stream.
pub const EVENT_DONE: &str = "done";

/// Request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

/// Data of a `text_delta` or `reasoning_delta` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDelta {
    pub text: String,
}

/// Data of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayErrorEvent {
    pub message: String,
}

/// Non-streaming response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReply {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    #[test]
    fn request_streams_by_default() {
        let req: RelayRequest =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"Hello"}]}"#).unwrap();
        assert!(req.stream);
        assert_eq!(req.messages[0].role, MessageRole::User);
        assert!(req.system.is_none());
    }

    #[test]
    fn request_rejects_unknown_role() {
        let result = serde_json::from_str::<RelayRequest>(
            r#"{"messages":[{"role":"wizard","content":"Hello"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn reply_omits_missing_reasoning() {
        let json = serde_json::to_string(&RelayReply {
            content: "Hi".to_string(),
            reasoning: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"content":"Hi"}"#);
    }
}
