//! Configuration loading and validation.
//!
//! Config is written in JSON5 and lives at `~/.evently/evently.json` unless
//! `EVENTLY_STATE_DIR` points somewhere else. Every field has a default, so a
//! missing file yields a usable development configuration.

mod auth;

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::{AuthConfig, AuthConfigBuilder, PasswordHashConfig};

/// Placeholder shown instead of secret values.
const REDACTED: &str = "********";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Token, hashing and rate limit settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Third-party login providers.
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("evently.json")
    }

    /// Get the Evently state directory.
    ///
    /// Uses `EVENTLY_STATE_DIR` env var if set, otherwise `~/.evently`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("EVENTLY_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".evently")
        } else {
            PathBuf::from(".evently")
        }
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = std::env::var("EVENTLY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.gateway.port = port;
        }

        if let Ok(url) = std::env::var("EVENTLY_FRONTEND_URL") {
            self.oauth.frontend_url = url;
        }

        self.oauth.google = provider_from_env("GOOGLE", self.oauth.google.take());
        self.oauth.facebook = provider_from_env("FACEBOOK", self.oauth.facebook.take());
        self.auth = self.auth.with_env_overrides();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        self.auth.validate()?;

        for (name, provider) in [("google", &self.oauth.google), ("facebook", &self.oauth.facebook)]
        {
            if let Some(p) = provider {
                if p.client_id.is_empty() || p.client_secret.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "OAuth provider '{name}' needs both clientId and clientSecret"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Copy of this config with every secret masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.auth = copy.auth.redacted();
        for provider in [&mut copy.oauth.google, &mut copy.oauth.facebook]
            .into_iter()
            .flatten()
        {
            provider.client_secret = REDACTED.to_string();
        }
        copy
    }
}

fn provider_from_env(
    prefix: &str,
    current: Option<OAuthProviderConfig>,
) -> Option<OAuthProviderConfig> {
    let id = std::env::var(format!("EVENTLY_{prefix}_CLIENT_ID")).ok();
    let secret = std::env::var(format!("EVENTLY_{prefix}_CLIENT_SECRET")).ok();

    match (current, id, secret) {
        (Some(mut cfg), id, secret) => {
            if let Some(id) = id {
                cfg.client_id = id;
            }
            if let Some(secret) = secret {
                cfg.client_secret = secret;
            }
            Some(cfg)
        }
        (None, Some(client_id), Some(client_secret)) => Some(OAuthProviderConfig {
            client_id,
            client_secret,
            callback_url: None,
        }),
        (None, _, _) => None,
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Directory holding the sled database.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Reverse proxies whose `X-Forwarded-For` header is believed.
    ///
    /// Requests from any other peer are keyed by the peer address.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            cors_origins: Vec::new(),
            timeout_secs: default_timeout(),
            data_dir: None,
            trusted_proxies: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Resolved data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("evently")
        })
    }
}

const fn default_port() -> u16 {
    3000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_timeout() -> u64 {
    30
}

/// Third-party login configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    /// Frontend base URL that receives tokens after a provider login.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Google sign-in.
    #[serde(default)]
    pub google: Option<OAuthProviderConfig>,

    /// Facebook sign-in.
    #[serde(default)]
    pub facebook: Option<OAuthProviderConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            frontend_url: default_frontend_url(),
            google: None,
            facebook: None,
        }
    }
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

/// Credentials for one OAuth provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthProviderConfig {
    /// Client ID issued by the provider.
    pub client_id: String,

    /// Client secret issued by the provider.
    pub client_secret: String,

    /// Callback URL registered with the provider.
    ///
    /// Defaults to `http://{bind}:{port}/auth/{provider}/callback`.
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl std::fmt::Debug for OAuthProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProviderConfig")
            .field("client_id", &self.client_id)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

/// Global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Enable debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.auth.access_token_ttl_secs, 900);
        assert_eq!(config.auth.refresh_token_ttl_secs, 30 * 24 * 3600);
        assert!(config.oauth.google.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("evently.json");

        let mut config = Config::default();
        config.gateway.port = 8080;
        config.oauth.google = Some(OAuthProviderConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            callback_url: None,
        });

        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gateway.port, 8080);
        assert_eq!(loaded.oauth.google.unwrap().client_id, "id");
    }

    #[test]
    fn test_json5_parsing() {
        let json5_content = r#"{
            // comments are allowed
            gateway: {
                port: 4000,
                trustedProxies: ["10.0.0.1"],
            },
            auth: {
                accessSecret: "a",
                refreshSecret: "b",
            },
            settings: { logFormat: "json" },
        }"#;

        let config: Config = json5::from_str(json5_content).unwrap();
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(
            config.gateway.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap()]
        );
        assert_eq!(config.auth.access_secret.as_deref(), Some("a"));
        assert_eq!(config.settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.gateway.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.oauth.facebook = Some(OAuthProviderConfig {
            client_id: String::new(),
            client_secret: "s".to_string(),
            callback_url: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Config::default();
        config.auth.access_secret = Some("super-secret".to_string());
        config.oauth.google = Some(OAuthProviderConfig {
            client_id: "id".to_string(),
            client_secret: "google-secret".to_string(),
            callback_url: None,
        });

        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("super-secret"));
        assert!(!shown.contains("google-secret"));
        assert!(shown.contains("\"clientId\":\"id\""));
    }

    #[test]
    fn test_state_dir() {
        let dir = Config::state_dir();
        assert!(dir.to_str().unwrap().contains("evently"));
    }
}
