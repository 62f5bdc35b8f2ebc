//! HTTP surface for rowsheet.
//!
//! Routes mirror the row operations of [`rowsheet_core::RowOrchestrator`]
//! under `/sheet/{id}/..`, plus the OAuth endpoints the Google backend needs.
//! Core calls block, so every handler runs them on tokio's blocking pool.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::{AuthError, StoredToken, TokenProvider};
pub use config::{BackendKind, ConfigError, ServerConfig};
pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, Backend};
