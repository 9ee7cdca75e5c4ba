//! Session lifecycle: register, login, refresh, logout.
//!
//! A user's session state lives entirely in `User::refresh_token_hash`.
//! `None` means signed out; otherwise it holds the hash of the only refresh
//! token that will be accepted. Every token issue overwrites it, so a new
//! login silently ends the previous session.

use std::sync::Arc;

use evently_core::{AuthConfig, validate_email, validate_name, validate_password};
use serde::{Deserialize, Serialize};

use super::{
    AuthError, ExternalProfile, NewUser, OAuthFederator, PasswordHasher, PublicUser, TokenIssuer,
    TokenPair, User, UserRole, UserStore, UserUpdate,
};

/// Registration request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

/// Login request body.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    /// Email address.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Profile changes requested through the users API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New email.
    pub email: Option<String>,
    /// New plaintext password.
    pub password: Option<String>,
    /// New role. Admin only.
    pub role: Option<UserRole>,
    /// New creator flag. Admin only.
    pub is_creator: Option<bool>,
}

/// Successful register/login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The signed-in user.
    pub user: PublicUser,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
}

/// Plain acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable message.
    pub message: String,
}

impl MessageResponse {
    /// Create a message response.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Orchestrates credentials, tokens and the user store.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    federator: OAuthFederator,
    /// Verified against when the account has no usable hash, so unknown
    /// emails cost as much as wrong passwords.
    dummy_hash: String,
}

impl AuthService {
    /// Create a service from its parts.
    ///
    /// # Errors
    ///
    /// Returns error if the hasher cannot produce its placeholder digest.
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        issuer: TokenIssuer,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash(&TokenIssuer::generate_hex_secret())?;
        Ok(Self {
            federator: OAuthFederator::new(Arc::clone(&store)),
            store,
            hasher,
            issuer,
            dummy_hash,
        })
    }

    /// Create a service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the hash cost or token secrets are unusable.
    pub fn from_config(config: &AuthConfig, store: Arc<dyn UserStore>) -> Result<Self, AuthError> {
        let hasher = PasswordHasher::new(&config.password_hash)?;
        let issuer = TokenIssuer::from_config(config)?;
        Self::new(store, hasher, issuer)
    }

    /// Token issuer used by this service.
    #[must_use]
    pub const fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Backing user store.
    #[must_use]
    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    /// Password hasher used by this service.
    #[must_use]
    pub const fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Create an account and start its first session.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a bad name, email or password, `DuplicateEmail`
    /// if the email is taken.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let name = validate_name(&request.name)?;
        let email = validate_email(&request.email)?;
        validate_password(&request.password)?;

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash_blocking(request.password).await?;
        let user = self
            .store
            .create(NewUser {
                password_hash: Some(password_hash),
                ..NewUser::regular(name, email)
            })
            .await?;

        tracing::info!(user_id = %user.id, "Registered user");
        self.issue_session(user).await
    }

    /// Authenticate with email and password.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown email, a wrong password or an
    /// account without a password. The three cases are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let user = self.store.find_by_email(email.trim()).await?;
        let digest = user
            .as_ref()
            .and_then(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());

        let matches = self
            .hasher
            .verify_blocking(password.to_string(), digest)
            .await;

        match user {
            Some(user) if matches && user.password_hash.is_some() => {
                tracing::debug!(user_id = %user.id, "Login succeeded");
                self.issue_session(user).await
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Sign in with a provider-verified identity.
    ///
    /// # Errors
    ///
    /// Returns error if the profile is unusable or the store fails.
    pub async fn login_oauth(&self, profile: ExternalProfile) -> Result<AuthResponse, AuthError> {
        let user = self.federator.resolve(profile).await?;
        self.issue_session(user).await
    }

    /// Replace the caller's token pair.
    ///
    /// Callers must already have passed the refresh guard.
    ///
    /// # Errors
    ///
    /// `UnauthorizedAccess` if the account no longer exists.
    pub async fn refresh_tokens(&self, user_id: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UnauthorizedAccess)?;

        let (_, pair) = self.rotate(&user).await.map_err(|e| match e {
            AuthError::NotFound(_) => AuthError::UnauthorizedAccess,
            other => other,
        })?;
        Ok(pair)
    }

    /// End the user's session. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns error only on storage failure.
    pub async fn logout(&self, user_id: &str) -> Result<MessageResponse, AuthError> {
        match self
            .store
            .update(user_id, UserUpdate::refresh_token_hash(None))
            .await
        {
            Ok(_) | Err(super::StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(user_id = %user_id, "Logged out");
        Ok(MessageResponse::new("Logged out successfully"))
    }

    /// Check a presented refresh token against the stored hash.
    ///
    /// # Errors
    ///
    /// `UnauthorizedAccess` if the user is gone, signed out, or the token
    /// has been superseded.
    pub async fn validate_refresh_token(
        &self,
        user_id: &str,
        presented: &str,
    ) -> Result<User, AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UnauthorizedAccess)?;

        let Some(stored) = user.refresh_token_hash.clone() else {
            return Err(AuthError::UnauthorizedAccess);
        };

        if self
            .hasher
            .verify_blocking(presented.to_string(), stored)
            .await
        {
            Ok(user)
        } else {
            tracing::debug!(user_id = %user_id, "Superseded refresh token presented");
            Err(AuthError::UnauthorizedAccess)
        }
    }

    /// Sanitized view of a user.
    ///
    /// # Errors
    ///
    /// `NotFound` if the account no longer exists.
    pub async fn current_user(&self, user_id: &str) -> Result<PublicUser, AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .map(|u| u.to_public())
            .ok_or_else(|| AuthError::NotFound("User".to_string()))
    }

    /// Apply profile changes on behalf of `actor_is_admin`.
    ///
    /// # Errors
    ///
    /// `Forbidden` if a non-admin touches role or creator flag,
    /// `InvalidInput` for bad values, `DuplicateEmail` for a taken email.
    pub async fn update_profile(
        &self,
        user_id: &str,
        changes: ProfileUpdate,
        actor_is_admin: bool,
    ) -> Result<PublicUser, AuthError> {
        if !actor_is_admin && (changes.role.is_some() || changes.is_creator.is_some()) {
            return Err(AuthError::Forbidden);
        }

        let mut update = UserUpdate {
            role: changes.role,
            is_creator: changes.is_creator,
            ..UserUpdate::default()
        };
        if let Some(name) = changes.name {
            update.name = Some(validate_name(&name)?);
        }
        if let Some(email) = changes.email {
            update.email = Some(validate_email(&email)?);
        }
        if let Some(password) = changes.password {
            validate_password(&password)?;
            update.password_hash = Some(self.hasher.hash_blocking(password).await?);
        }

        let user = self.store.update(user_id, update).await?;
        Ok(user.to_public())
    }

    /// Issue a pair, persist its refresh hash and build the response.
    async fn issue_session(&self, user: User) -> Result<AuthResponse, AuthError> {
        let (user, pair) = self.rotate(&user).await?;
        Ok(AuthResponse {
            user: user.to_public(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    async fn rotate(&self, user: &User) -> Result<(User, TokenPair), AuthError> {
        let pair = self.issuer.issue_pair(&user.id, &user.email)?;
        let hash = self.hasher.hash_blocking(pair.refresh_token.clone()).await?;
        let user = self
            .store
            .update(&user.id, UserUpdate::refresh_token_hash(Some(hash)))
            .await?;
        Ok((user, pair))
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("hasher", &self.hasher)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}
