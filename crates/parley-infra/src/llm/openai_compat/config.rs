//! Configuration types and per-provider defaults for OpenAI-compatible providers.
//!
//! Each hosted provider that speaks the OpenAI chat completions protocol gets
//! a factory function returning an [`OpenAiCompatConfig`] with the correct
//! base URL.

/// Configuration for an OpenAI-compatible completion provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai", "groq").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
}

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// OpenAI default configuration.
pub fn openai_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: OPENAI_BASE_URL.into(),
        api_key: api_key.into(),
        model: model.into(),
    }
}

/// Groq default configuration.
///
/// Groq's reasoning models emit their reasoning inline between `<think>`
/// tags, which the completion client separates out.
pub fn groq_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "groq".into(),
        base_url: GROQ_BASE_URL.into(),
        api_key: api_key.into(),
        model: model.into(),
    }
}
