//! Admin REST API and API-key middleware for keygate.
//!
//! This crate is the HTTP surface over the key and token managers. It
//! provides:
//!
//! - The admin router (`/api-keys`, `/tokens`, `/login`, ...) guarded by
//!   admin sessions
//! - [`require_api_key`], a middleware that admits proxied API traffic only
//!   for verified keys
//! - Configuration from environment variables
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Admin clients / API clients                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       keygate-gateway                       │
//! │  ┌──────────────┐ ┌──────────────┐ ┌─────────────────────┐  │
//! │  │ AdminSession │ │    Router    │ │  require_api_key    │  │
//! │  │  Extractor   │ │  + Handlers  │ │  middleware         │  │
//! │  └──────────────┘ └──────────────┘ └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌────────────┐ ┌────────────┐ ┌────────────┐
//!        │ KeyManager │ │ TokenPool  │ │  AuthGate  │
//!        └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use keygate_gateway::{create_router, GatewayConfig, GatewayState};
//! use keygate_store::open_store;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let store = open_store(&config.store)?;
//! let state = GatewayState::from_store(store, config);
//! state.keys.reload().await?;
//! state.tokens.reload().await?;
//! state.settings.reload().await?;
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::{require_api_key, AdminSession, ApiCaller};
pub use config::{ConfigError, GatewayConfig, ServerConfig};
pub use error::ApiError;
pub use routes::{create_router, protect_with_api_key};
pub use state::GatewayState;
