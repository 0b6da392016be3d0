//! Global configuration types for Parley.
//!
//! `GlobalConfig` represents the top-level `config.toml`: which completion
//! provider to use, where the auth service lives, and how the relay
//! endpoint binds.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderType;

/// Top-level configuration.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

/// Completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderType,

    /// Model override; the provider's default model when absent.
    #[serde(default)]
    pub model: Option<String>,

    /// Endpoint override. Required when `provider = "relay"`.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f64>,

    /// Per-request deadline in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Tag wrapping inline reasoning (`<think>...</think>`). Empty disables extraction.
    #[serde(default = "default_reasoning_tag")]
    pub reasoning_tag: String,
}

impl CompletionConfig {
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Tag to extract inline reasoning with. Always `None` against a relay,
    /// which sends reasoning already split from the reply text.
    pub fn reasoning_tag(&self) -> Option<&str> {
        if self.provider == ProviderType::Relay {
            return None;
        }
        let tag = self.reasoning_tag.trim();
        (!tag.is_empty()).then_some(tag)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            deadline_secs: default_deadline_secs(),
            reasoning_tag: default_reasoning_tag(),
        }
    }
}

/// Hosted auth service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the auth service, e.g. `https://<project>.supabase.co`.
    #[serde(default)]
    pub url: Option<String>,

    /// Environment variable holding the public (anon) API key.
    #[serde(default = "default_anon_key_env")]
    pub anon_key_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key_env: default_anon_key_env(),
        }
    }
}

/// Bind address for `parley serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,

    #[serde(default = "default_relay_port")]
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
        }
    }
}

fn default_provider() -> ProviderType {
    ProviderType::OpenAi
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_deadline_secs() -> u64 {
    120
}

fn default_reasoning_tag() -> String {
    "think".to_string()
}

fn default_anon_key_env() -> String {
    "PARLEY_AUTH_ANON_KEY".to_string()
}

fn default_relay_host() -> String {
    "127.0.0.1".to_string()
}

fn default_relay_port() -> u16 {
    3000
}
