//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, REDACTED};

/// Default access token lifetime (15 minutes).
const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
/// Default refresh token lifetime (30 days).
const DEFAULT_REFRESH_TTL_SECS: u64 = 30 * 24 * 3600;
/// Default login/register attempts per client per minute.
const DEFAULT_LOGIN_RATE_LIMIT: u32 = 20;

/// Authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Secret signing access tokens. Generated per process if not set.
    #[serde(default)]
    pub access_secret: Option<String>,

    /// Secret signing refresh tokens. Must differ from the access secret.
    #[serde(default)]
    pub refresh_secret: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,

    /// Argon2 cost parameters.
    #[serde(default)]
    pub password_hash: PasswordHashConfig,

    /// Login and register attempts allowed per client per minute.
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit_per_minute: u32,
}

const fn default_access_ttl() -> u64 {
    DEFAULT_ACCESS_TTL_SECS
}

const fn default_refresh_ttl() -> u64 {
    DEFAULT_REFRESH_TTL_SECS
}

const fn default_login_rate_limit() -> u32 {
    DEFAULT_LOGIN_RATE_LIMIT
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: None,
            refresh_secret: None,
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            password_hash: PasswordHashConfig::default(),
            login_rate_limit_per_minute: default_login_rate_limit(),
        }
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_ttl_secs)
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_ttl_secs)
    }

    /// Apply `EVENTLY_ACCESS_SECRET` / `EVENTLY_REFRESH_SECRET`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("EVENTLY_ACCESS_SECRET") {
            self.access_secret = Some(secret);
        }
        if let Ok(secret) = std::env::var("EVENTLY_REFRESH_SECRET") {
            self.refresh_secret = Some(secret);
        }
        self
    }

    /// Check lifetimes and secrets are consistent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_ttl_secs == 0 || self.refresh_token_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "Token lifetimes must be positive".to_string(),
            ));
        }

        if self.access_token_ttl_secs >= self.refresh_token_ttl_secs {
            return Err(ConfigError::Validation(
                "Access token lifetime must be shorter than refresh token lifetime".to_string(),
            ));
        }

        if let (Some(access), Some(refresh)) = (&self.access_secret, &self.refresh_secret) {
            if access == refresh {
                return Err(ConfigError::Validation(
                    "Access and refresh secrets must differ".to_string(),
                ));
            }
        }

        if self.access_secret.as_deref() == Some("") || self.refresh_secret.as_deref() == Some("")
        {
            return Err(ConfigError::Validation(
                "Token secrets cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub(super) fn redacted(mut self) -> Self {
        if self.access_secret.is_some() {
            self.access_secret = Some(REDACTED.to_string());
        }
        if self.refresh_secret.is_some() {
            self.refresh_secret = Some(REDACTED.to_string());
        }
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret_set", &self.access_secret.is_some())
            .field("refresh_secret_set", &self.refresh_secret.is_some())
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("password_hash", &self.password_hash)
            .field("login_rate_limit_per_minute", &self.login_rate_limit_per_minute)
            .finish()
    }
}

/// Argon2id cost parameters.
///
/// Defaults match the argon2 crate's recommended settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordHashConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordHashConfig {
    /// Cheapest parameters argon2 accepts. Only suitable for tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the access token secret.
    #[must_use]
    pub fn access_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.access_secret = Some(secret.into());
        self
    }

    /// Set the refresh token secret.
    #[must_use]
    pub fn refresh_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.refresh_secret = Some(secret.into());
        self
    }

    /// Set access token lifetime in seconds.
    #[must_use]
    pub const fn access_token_ttl_secs(mut self, secs: u64) -> Self {
        self.config.access_token_ttl_secs = secs;
        self
    }

    /// Set refresh token lifetime in seconds.
    #[must_use]
    pub const fn refresh_token_ttl_secs(mut self, secs: u64) -> Self {
        self.config.refresh_token_ttl_secs = secs;
        self
    }

    /// Set argon2 cost parameters.
    #[must_use]
    pub const fn password_hash(mut self, cost: PasswordHashConfig) -> Self {
        self.config.password_hash = cost;
        self
    }

    /// Set the per-client login rate limit.
    #[must_use]
    pub const fn login_rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.config.login_rate_limit_per_minute = limit;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}
