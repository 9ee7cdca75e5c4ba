//! # Evently Gateway
//!
//! HTTP gateway for the Evently platform: accounts, sessions, third-party
//! sign-in and the per-route permission model, plus the favorites API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
/// Error envelope rendering.
pub mod error;
/// Favorite events storage.
pub mod favorites;
mod middleware;
mod routes;
mod server;

pub use auth::{AuthError, AuthService, CurrentUser, RoutePolicy, User, UserRole, UserStore};
pub use error::ErrorEnvelope;
pub use favorites::{Favorite, FavoriteStore};
pub use middleware::GatewayRateLimiter;
pub use server::{Gateway, GatewayBuilder, GatewayState};

use evently_core::Config;

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
