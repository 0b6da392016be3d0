//! Completion provider implementations.
//!
//! Contains concrete implementations of the [`LlmProvider`] trait defined in
//! `parley-core`, plus a factory ([`create_provider`]) that builds the one
//! provider named by configuration.
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod openai_compat;
pub mod relay;

use secrecy::{ExposeSecret, SecretString};

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_types::config::CompletionConfig;
use parley_types::llm::{LlmError, ProviderType};

use crate::keychain::SecretStore;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::OpenAiCompatConfig;
use self::relay::RelayProvider;

/// Environment variable (and keychain account) holding the provider's API key.
pub fn api_key_name(provider: ProviderType) -> Option<&'static str> {
    match provider {
        ProviderType::OpenAi => Some("OPENAI_API_KEY"),
        ProviderType::Groq => Some("GROQ_API_KEY"),
        ProviderType::Relay => None,
    }
}

/// Resolve the API key for `provider`: environment first, then the keychain.
///
/// Returns `None` for providers that need no key or when nothing is stored.
pub fn resolve_api_key(provider: ProviderType, keychain: &impl SecretStore) -> Option<SecretString> {
    let name = api_key_name(provider)?;

    if let Ok(value) = std::env::var(name) {
        if !value.trim().is_empty() {
            return Some(SecretString::from(value));
        }
    }

    match keychain.get(name) {
        Ok(value) => value.map(SecretString::from),
        Err(e) => {
            tracing::warn!(key = name, error = %e, "failed to read API key from keychain");
            None
        }
    }
}

/// Create a [`BoxLlmProvider`] from the completion configuration.
///
/// # Errors
///
/// `AuthenticationFailed` when a hosted provider has no API key, and
/// `InvalidRequest` when the relay provider has no `base_url`.
pub fn create_provider(
    config: &CompletionConfig,
    api_key: Option<&SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let model = config.resolved_model();

    match config.provider {
        ProviderType::OpenAi | ProviderType::Groq => {
            let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            let key = key.expose_secret();

            let provider = match config.base_url.as_deref() {
                Some(base_url) => OpenAiCompatibleProvider::new(OpenAiCompatConfig {
                    provider_name: config.provider.to_string(),
                    base_url: base_url.to_string(),
                    api_key: key.to_string(),
                    model: model.clone(),
                }),
                None if config.provider == ProviderType::Groq => {
                    OpenAiCompatibleProvider::groq(key, &model)
                }
                None => OpenAiCompatibleProvider::openai(key, &model),
            };
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::Relay => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                LlmError::InvalidRequest(
                    "completion.base_url must name the relay server".to_string(),
                )
            })?;
            Ok(BoxLlmProvider::new(RelayProvider::new(base_url)))
        }
    }
}
