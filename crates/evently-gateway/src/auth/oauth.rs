//! Third-party sign-in.
//!
//! Providers run the authorization-code flow and hand back an
//! [`ExternalProfile`]. The [`OAuthFederator`] maps that profile onto a
//! local account by exact email match, creating the account on first
//! sight. A local password account and a provider login that share an
//! email end up as the same user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use evently_core::config::{GatewayConfig, OAuthConfig};
use evently_core::validation::display_name_or_fallback;
use evently_core::{OAuthProviderConfig, validate_email};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{AuthError, NewUser, StoreError, TokenIssuer, TokenPair, User, UserStore};

/// How long an issued `state` value stays redeemable.
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on outstanding `state` values.
const MAX_PENDING_STATES: usize = 10_000;

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProviderKind {
    /// Google.
    Google,
    /// Facebook.
    Facebook,
}

impl OAuthProviderKind {
    /// Path segment and config name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for OAuthProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProviderKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            _ => Err(AuthError::NotFound("Provider".to_string())),
        }
    }
}

/// Identity asserted by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    /// Asserting provider.
    pub provider: OAuthProviderKind,
    /// Provider-side user ID.
    pub provider_id: String,
    /// Verified email.
    pub email: String,
    /// Display name as given by the provider.
    pub name: String,
    /// Picture URL.
    pub avatar: Option<String>,
}

/// Maps provider identities onto local accounts.
pub struct OAuthFederator {
    store: Arc<dyn UserStore>,
}

impl OAuthFederator {
    /// Create a federator over a user store.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Find or create the local user for a profile.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the profile email is unusable; store failures
    /// otherwise.
    pub async fn resolve(&self, profile: ExternalProfile) -> Result<User, AuthError> {
        let email = validate_email(&profile.email)?;

        if let Some(user) = self.store.find_by_email(&email).await? {
            tracing::debug!(
                user_id = %user.id,
                provider = %profile.provider,
                "Matched provider login to existing user"
            );
            return Ok(user);
        }

        let new_user = NewUser {
            avatar: profile.avatar,
            ..NewUser::regular(display_name_or_fallback(&profile.name, &email), email.clone())
        };

        match self.store.create(new_user).await {
            Ok(user) => {
                tracing::info!(
                    user_id = %user.id,
                    provider = %profile.provider,
                    "Created user from provider login"
                );
                Ok(user)
            }
            // Lost a race with a concurrent first login.
            Err(StoreError::Duplicate(_)) => self
                .store
                .find_by_email(&email)
                .await?
                .ok_or_else(|| AuthError::Internal("User vanished during creation".to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// One identity provider's authorization-code flow.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> OAuthProviderKind;

    /// URL the browser is sent to, carrying `state`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be built.
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError>;

    /// Exchange an authorization code for the user's profile.
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the code or returns no email.
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AuthError>;
}

/// Client credentials plus the callback registered with the provider.
#[derive(Clone)]
struct ClientCredentials {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl ClientCredentials {
    fn new(kind: OAuthProviderKind, config: &OAuthProviderConfig, gateway: &GatewayConfig) -> Self {
        let redirect_uri = config.callback_url.clone().unwrap_or_else(|| {
            format!(
                "http://{}:{}/auth/{}/callback",
                gateway.bind_address, gateway.port, kind
            )
        });
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn upstream_error(provider: OAuthProviderKind, err: &reqwest::Error) -> AuthError {
    tracing::warn!(provider = %provider, error = %err, "Provider request failed");
    AuthError::UnauthorizedAccess
}

fn missing_email(provider: OAuthProviderKind) -> AuthError {
    AuthError::InvalidInput(format!("{provider} account has no email address"))
}

/// Google sign-in.
pub struct GoogleProvider {
    credentials: ClientCredentials,
    http: reqwest::Client,
}

impl GoogleProvider {
    const AUTHORIZE_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    const USERINFO_URL: &'static str = "https://openidconnect.googleapis.com/v1/userinfo";

    /// Create from configuration.
    #[must_use]
    pub fn new(config: &OAuthProviderConfig, gateway: &GatewayConfig, http: reqwest::Client) -> Self {
        Self {
            credentials: ClientCredentials::new(OAuthProviderKind::Google, config, gateway),
            http,
        }
    }
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleUserInfo {
    /// Only a Google-verified email may be linked to a local account.
    fn into_profile(self) -> Result<ExternalProfile, AuthError> {
        let kind = OAuthProviderKind::Google;
        let email = self.email.ok_or_else(|| missing_email(kind))?;
        if self.email_verified != Some(true) {
            tracing::warn!(provider = %kind, "Rejected login with unverified email");
            return Err(AuthError::InvalidInput(format!(
                "{kind} account email is not verified"
            )));
        }

        Ok(ExternalProfile {
            provider: kind,
            provider_id: self.sub,
            email,
            name: self.name.unwrap_or_default(),
            avatar: self.picture,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn kind(&self) -> OAuthProviderKind {
        OAuthProviderKind::Google
    }

    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        Url::parse_with_params(
            Self::AUTHORIZE_URL,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Internal(format!("Bad authorize URL: {e}")))
    }

    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AuthError> {
        let kind = self.kind();
        let token: TokenResponse = self
            .http
            .post(Self::TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream_error(kind, &e))?
            .json()
            .await
            .map_err(|e| upstream_error(kind, &e))?;

        let info: GoogleUserInfo = self
            .http
            .get(Self::USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream_error(kind, &e))?
            .json()
            .await
            .map_err(|e| upstream_error(kind, &e))?;

        info.into_profile()
    }
}

/// Facebook sign-in.
pub struct FacebookProvider {
    credentials: ClientCredentials,
    http: reqwest::Client,
}

impl FacebookProvider {
    const AUTHORIZE_URL: &'static str = "https://www.facebook.com/v19.0/dialog/oauth";
    const TOKEN_URL: &'static str = "https://graph.facebook.com/v19.0/oauth/access_token";
    const PROFILE_URL: &'static str = "https://graph.facebook.com/me";

    /// Create from configuration.
    #[must_use]
    pub fn new(config: &OAuthProviderConfig, gateway: &GatewayConfig, http: reqwest::Client) -> Self {
        Self {
            credentials: ClientCredentials::new(OAuthProviderKind::Facebook, config, gateway),
            http,
        }
    }
}

#[derive(Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct FacebookPicture {
    data: Option<FacebookPictureData>,
}

#[derive(Deserialize)]
struct FacebookProfile {
    id: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[async_trait]
impl OAuthProvider for FacebookProvider {
    fn kind(&self) -> OAuthProviderKind {
        OAuthProviderKind::Facebook
    }

    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        Url::parse_with_params(
            Self::AUTHORIZE_URL,
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "email,public_profile"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Internal(format!("Bad authorize URL: {e}")))
    }

    async fn exchange(&self, code: &str) -> Result<ExternalProfile, AuthError> {
        let kind = self.kind();
        let token: TokenResponse = self
            .http
            .get(Self::TOKEN_URL)
            .query(&[
                ("code", code),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream_error(kind, &e))?
            .json()
            .await
            .map_err(|e| upstream_error(kind, &e))?;

        let profile: FacebookProfile = self
            .http
            .get(Self::PROFILE_URL)
            .query(&[
                ("fields", "id,name,email,picture"),
                ("access_token", token.access_token.as_str()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream_error(kind, &e))?
            .json()
            .await
            .map_err(|e| upstream_error(kind, &e))?;

        Ok(ExternalProfile {
            provider: kind,
            provider_id: profile.id,
            email: profile.email.ok_or_else(|| missing_email(kind))?,
            name: profile.name.unwrap_or_default(),
            avatar: profile.picture.and_then(|p| p.data).and_then(|d| d.url),
        })
    }
}

/// Single-use `state` values guarding the callback against CSRF.
///
/// At most `capacity` values are pending at once; issuing past that evicts
/// the oldest.
pub struct OAuthStateStore {
    pending: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::with_limits(STATE_TTL, MAX_PENDING_STATES)
    }
}

impl OAuthStateStore {
    /// Create a store whose values expire after `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, MAX_PENDING_STATES)
    }

    /// Create a store with an explicit expiry and size cap.
    #[must_use]
    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Issue a fresh state value.
    pub async fn issue(&self) -> String {
        let state = hex::encode(&TokenIssuer::generate_secret()[..16]);
        let mut pending = self.pending.lock().await;
        let now = Instant::now();
        pending.retain(|_, issued| now.duration_since(*issued) < self.ttl);

        while pending.len() >= self.capacity {
            let Some(oldest) = pending
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            pending.remove(&oldest);
        }

        pending.insert(state.clone(), now);
        state
    }

    /// Redeem a state value. Each value succeeds at most once.
    pub async fn consume(&self, state: &str) -> bool {
        self.pending
            .lock()
            .await
            .remove(state)
            .is_some_and(|issued| issued.elapsed() < self.ttl)
    }

    /// Number of values awaiting a callback.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Configured providers and the redirects around them.
pub struct OAuthRegistry {
    providers: HashMap<OAuthProviderKind, Arc<dyn OAuthProvider>>,
    states: OAuthStateStore,
    frontend_url: String,
}

impl OAuthRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            states: OAuthStateStore::default(),
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the registry from configuration. Unconfigured providers are skipped.
    #[must_use]
    pub fn from_config(oauth: &OAuthConfig, gateway: &GatewayConfig) -> Self {
        let mut registry = Self::new(oauth.frontend_url.clone());
        let http = reqwest::Client::new();

        if let Some(google) = &oauth.google {
            registry.register(Arc::new(GoogleProvider::new(google, gateway, http.clone())));
        }
        if let Some(facebook) = &oauth.facebook {
            registry.register(Arc::new(FacebookProvider::new(facebook, gateway, http)));
        }
        registry
    }

    /// Add or replace a provider.
    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        tracing::info!(provider = %provider.kind(), "Enabled OAuth provider");
        self.providers.insert(provider.kind(), provider);
    }

    /// Look up a provider by path segment.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is unknown or the provider is not configured.
    pub fn get(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, AuthError> {
        let kind: OAuthProviderKind = name.parse()?;
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AuthError::NotFound("Provider".to_string()))
    }

    /// Enabled provider kinds.
    #[must_use]
    pub fn enabled(&self) -> Vec<OAuthProviderKind> {
        self.providers.keys().copied().collect()
    }

    /// Pending state values.
    #[must_use]
    pub const fn states(&self) -> &OAuthStateStore {
        &self.states
    }

    /// Start a login: issue a state and build the provider URL.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown providers.
    pub async fn begin(&self, name: &str) -> Result<Url, AuthError> {
        let provider = self.get(name)?;
        let state = self.states.issue().await;
        provider.authorize_url(&state)
    }

    /// Frontend URL carrying a fresh token pair.
    #[must_use]
    pub fn success_redirect(&self, pair: &TokenPair) -> String {
        let base = format!("{}/auth/callback", self.frontend_url);
        Url::parse_with_params(
            &base,
            &[
                ("access_token", pair.access_token.as_str()),
                ("refresh_token", pair.refresh_token.as_str()),
            ],
        )
        .map_or_else(|_| self.failure_redirect(), String::from)
    }

    /// Frontend URL reporting a failed provider login.
    #[must_use]
    pub fn failure_redirect(&self) -> String {
        format!("{}/login?error=oauth_failed", self.frontend_url)
    }
}

impl std::fmt::Debug for OAuthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthRegistry")
            .field("providers", &self.enabled())
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}
