//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both the CLI and
//! the relay server. Services are generic over port traits; AppState pins
//! them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use parley_core::auth::service::{AuthService, resolve_owner};
use parley_core::chat::service::ChatHistoryService;
use parley_core::llm::completion::{CompletionSettings, ProviderCompletionClient};
use parley_infra::auth::{GoTrueAuthBackend, LocalAuthStorage};
use parley_infra::config::{database_url, load_global_config, resolve_data_dir};
use parley_infra::keychain::KeychainStore;
use parley_infra::llm::{create_provider, resolve_api_key};
use parley_infra::sqlite::chat_history::SqliteChatHistoryRepository;
use parley_infra::sqlite::pool::DatabasePool;
use parley_types::chat::OwnerId;
use parley_types::config::GlobalConfig;
use tracing::debug;

use crate::cli::auth::TerminalVerifier;
use crate::http::router::RelayState;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteHistoryService = ChatHistoryService<SqliteChatHistoryRepository>;

pub type ConcreteAuthService = AuthService<GoTrueAuthBackend, LocalAuthStorage, TerminalVerifier>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<ConcreteHistoryService>,
    pub auth_storage: Arc<LocalAuthStorage>,
    pub keychain: KeychainStore,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;
        debug!(
            data_dir = %data_dir.display(),
            provider = %config.completion.provider,
            "loaded configuration"
        );

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open the chat history database")?;

        let history_repo = Arc::new(SqliteChatHistoryRepository::new(db_pool));
        let history = Arc::new(ChatHistoryService::new(history_repo));

        let keychain = KeychainStore::new();
        let auth_storage = Arc::new(LocalAuthStorage::new(&data_dir, keychain.clone()));

        Ok(Self {
            history,
            auth_storage,
            keychain,
            config,
            data_dir,
        })
    }

    /// Owner of the signed-in session.
    pub fn owner(&self) -> anyhow::Result<OwnerId> {
        resolve_owner(self.auth_storage.as_ref())
            .context("run `parley auth sign-in` first")
    }

    /// Completion client for the configured provider.
    pub fn completion_client(&self) -> anyhow::Result<ProviderCompletionClient> {
        let completion = &self.config.completion;
        let api_key = resolve_api_key(completion.provider, &self.keychain);
        let provider = create_provider(completion, api_key.as_ref()).with_context(|| {
            format!(
                "cannot use the {} provider (set its API key or base_url)",
                completion.provider
            )
        })?;
        Ok(ProviderCompletionClient::new(
            provider,
            CompletionSettings::from_config(completion),
        ))
    }

    /// Auth service against the configured hosted backend.
    pub fn auth_service(&self) -> anyhow::Result<ConcreteAuthService> {
        let backend = GoTrueAuthBackend::from_config(&self.config.auth)
            .context("auth is not configured; set [auth] url in config.toml")?;
        let storage = LocalAuthStorage::new(&self.data_dir, self.keychain.clone());
        Ok(AuthService::new(backend, storage, TerminalVerifier))
    }

    /// State for the relay HTTP server.
    pub fn relay_state(&self) -> anyhow::Result<RelayState> {
        Ok(RelayState::new(self.completion_client()?))
    }
}
