//! Authentication and authorization for the gateway.
//!
//! This module provides:
//! - Argon2 hashing for passwords and stored refresh tokens
//! - Access/refresh token issuing and verification
//! - The session lifecycle (register, login, refresh, logout)
//! - Google/Facebook sign-in mapped onto local accounts
//! - Per-route guards: public, authenticated, role and ownership checks

pub mod guards;
mod jwt;
pub mod oauth;
mod password;
mod service;
mod users;

pub use guards::{CurrentUser, PolicyGuard, RoutePolicy, enforce};
pub use jwt::{Claims, TokenIssuer, TokenKind, TokenPair};
pub use oauth::{ExternalProfile, OAuthFederator, OAuthProvider, OAuthProviderKind, OAuthRegistry};
pub use password::PasswordHasher;
pub use service::{
    AuthResponse, AuthService, LoginRequest, MessageResponse, ProfileUpdate, RegisterRequest,
};
pub use users::{
    NewUser, ParseRoleError, PublicUser, SledUserStore, StoreError, User, UserRole, UserStore,
    UserUpdate,
};

use evently_core::ValidationError;
use thiserror::Error;

/// Authentication and authorization errors.
///
/// Every variant maps to one HTTP status; see [`AuthError::status_code`].
#[derive(Debug, Error)]
pub enum AuthError {
    /// Request body or parameter failed validation.
    #[error("{0}")]
    InvalidInput(String),

    /// An account already uses this email.
    #[error("An account with this email already exists")]
    DuplicateEmail,

    /// Unknown email or wrong password. Deliberately indistinguishable.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// No usable credential was presented.
    #[error("You must be logged in to access this resource")]
    UnauthorizedAccess,

    /// Token signature is fine but it has expired.
    #[error("Your session has expired, please sign in again")]
    TokenExpired,

    /// Token could not be decoded or verified.
    #[error("Invalid token, please sign in again")]
    TokenMalformed,

    /// Caller lacks the role or ownership required.
    #[error("Access denied")]
    Forbidden,

    /// Resource already exists.
    #[error("{0} already exists")]
    Conflict(String),

    /// Resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Client exceeded the request budget.
    #[error("Too many requests, please try again later")]
    TooManyRequests,

    /// Storage or unexpected failure. The detail is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => Self::DuplicateEmail,
            StoreError::NotFound(_) => Self::NotFound("User".to_string()),
            StoreError::Backend(detail) => Self::Internal(detail),
        }
    }
}
