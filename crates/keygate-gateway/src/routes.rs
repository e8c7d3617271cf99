//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::handlers::{api_keys, health, session, settings, tokens};
use crate::state::GatewayState;

/// Create the admin router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /login` - Admin login
///
/// ## Admin session
/// - `POST /logout` - End the session
/// - `GET /api-keys` - List keys
/// - `POST /api-keys` - Create key
/// - `PUT /api-keys` - Update key
/// - `DELETE /api-keys` - Delete key
/// - `GET /api-keys/stats` - Key counts
/// - `GET /tokens` - List tokens with effective config
/// - `POST /tokens` - Add tokens
/// - `DELETE /tokens` - Remove tokens
/// - `POST /tokens/config` - Change network overrides
/// - `POST /tokens/tags` - Replace tags
/// - `GET /tokens/tags` - Every tag in use
/// - `POST /tokens/note` - Replace note
/// - `GET /tokens/stats` - Token counts
/// - `GET /settings` - Global network defaults
/// - `POST /settings` - Change global network defaults
/// - `GET /storage/mode` - Active store backend
pub fn create_router(state: GatewayState) -> Router {
    let state = Arc::new(state);
    let server = &state.config.server;
    let cors = build_cors_layer(&server.cors_origins);
    let max_body_bytes = server.max_body_bytes;
    let request_timeout = server.request_timeout();

    Router::new()
        // Public
        .route("/health", get(health::health))
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        // API keys
        .route(
            "/api-keys",
            get(api_keys::list_keys)
                .post(api_keys::create_key)
                .put(api_keys::update_key)
                .delete(api_keys::delete_key),
        )
        .route("/api-keys/stats", get(api_keys::key_stats))
        // Tokens
        .route(
            "/tokens",
            get(tokens::list_tokens)
                .post(tokens::create_tokens)
                .delete(tokens::delete_tokens),
        )
        .route("/tokens/config", post(tokens::update_token_config))
        .route(
            "/tokens/tags",
            get(tokens::list_tags).post(tokens::update_tags),
        )
        .route("/tokens/note", post(tokens::update_note))
        .route("/tokens/stats", get(tokens::token_stats))
        // Settings
        .route(
            "/settings",
            get(settings::get_settings).post(settings::update_settings),
        )
        // Storage
        .route("/storage/mode", get(health::storage_mode))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Require a valid API key on every route of `router`.
///
/// Requests that fail verification never reach the wrapped handlers.
pub fn protect_with_api_key<S>(router: Router<Arc<GatewayState>>, state: S) -> Router
where
    S: Into<Arc<GatewayState>>,
{
    let state = state.into();
    router
        .route_layer(from_fn_with_state(Arc::clone(&state), require_api_key))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
