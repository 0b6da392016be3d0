//! Axum router for the relay server.
//!
//! Routes: `POST /api/chat`, `GET /health`.
//! Middleware: CORS, tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_core::llm::completion::{CompletionClient, ProviderCompletionClient};
use parley_infra::llm::relay::CHAT_PATH;

use crate::http::handlers;

/// Shared state of the relay: the upstream completion client.
pub struct RelayState<C = ProviderCompletionClient> {
    pub client: Arc<C>,
}

impl<C> RelayState<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl<C> Clone for RelayState<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

/// Build the relay router with all routes and middleware.
pub fn build_router<C>(state: RelayState<C>) -> Router
where
    C: CompletionClient + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(CHAT_PATH, post(handlers::chat::chat::<C>))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
