//! Access and refresh token issuing.

use std::time::Duration;

use chrono::Utc;
use evently_core::AuthConfig;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;

/// Token claims. Both token kinds share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Email at issue time.
    pub email: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID.
    pub jti: String,
}

/// Which secret and lifetime a token uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived token sent on every protected request.
    Access,
    /// Long-lived token only accepted by the refresh endpoint.
    Refresh,
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Signs and verifies tokens.
///
/// Access and refresh tokens use distinct secrets, so neither kind is
/// accepted where the other is expected.
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl TokenIssuer {
    /// Create an issuer from two secrets.
    ///
    /// # Errors
    ///
    /// Returns error if the secrets are empty or identical.
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AuthError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AuthError::Internal("Token secrets cannot be empty".to_string()));
        }
        if access_secret == refresh_secret {
            return Err(AuthError::Internal(
                "Access and refresh secrets must differ".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            access: SigningKeys::new(access_secret, access_ttl),
            refresh: SigningKeys::new(refresh_secret, refresh_ttl),
            validation,
        })
    }

    /// Create an issuer from configuration, generating missing secrets.
    ///
    /// Generated secrets live only as long as the process, so every
    /// restart signs users out.
    ///
    /// # Errors
    ///
    /// Returns error if the configured secrets are unusable.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let access = config.access_secret.clone().unwrap_or_else(|| {
            tracing::warn!("No access token secret configured, generated an ephemeral one");
            Self::generate_hex_secret()
        });
        let refresh = config.refresh_secret.clone().unwrap_or_else(|| {
            tracing::warn!("No refresh token secret configured, generated an ephemeral one");
            Self::generate_hex_secret()
        });

        Self::new(
            access.as_bytes(),
            refresh.as_bytes(),
            config.access_ttl(),
            config.refresh_ttl(),
        )
    }

    /// Generate a random 256-bit secret key.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random secret as hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }

    const fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn issue(&self, kind: TokenKind, user_id: &str, email: &str) -> Result<String, AuthError> {
        let keys = self.keys(kind);
        let now = Utc::now();
        let exp = now + chrono::Duration::from_std(keys.ttl).unwrap_or_default();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {e}")))
    }

    /// Issue an access token.
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails.
    pub fn issue_access_token(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        self.issue(TokenKind::Access, user_id, email)
    }

    /// Issue a refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails.
    pub fn issue_refresh_token(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        self.issue(TokenKind::Refresh, user_id, email)
    }

    /// Issue both tokens for a user.
    ///
    /// # Errors
    ///
    /// Returns error if either encoding fails.
    pub fn issue_pair(&self, user_id: &str, email: &str) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, email)?,
            refresh_token: self.issue_refresh_token(user_id, email)?,
        })
    }

    /// Verify a token of the given kind and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired` for an expired but otherwise valid token and
    /// `TokenMalformed` for anything else.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenMalformed,
            })
    }

    /// Extract token from an Authorization header value.
    ///
    /// Expects format: "Bearer <token>"
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access.ttl)
            .field("refresh_ttl", &self.refresh.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_issuer() -> TokenIssuer {
        TokenIssuer::new(
            b"access-secret-for-tests",
            b"refresh-secret-for-tests",
            Duration::from_secs(15 * 60),
            Duration::from_secs(30 * 86400),
        )
        .unwrap()
    }

    fn expired_token(issuer: &TokenIssuer, kind: TokenKind) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "user_1".to_string(),
            email: "a@x.com".to_string(),
            iat: now - 120,
            exp: now - 60,
            jti: "old".to_string(),
        };
        encode(&Header::default(), &claims, &issuer.keys(kind).encoding).unwrap()
    }

    #[test]
    fn test_generate_secret() {
        let secret1 = TokenIssuer::generate_secret();
        let secret2 = TokenIssuer::generate_secret();
        assert_ne!(secret1, secret2);
        assert_eq!(TokenIssuer::generate_hex_secret().len(), 64);
    }

    #[test]
    fn test_access_token_claims() {
        let issuer = create_issuer();
        let token = issuer.issue_access_token("user_1", "a@x.com").unwrap();

        let claims = issuer.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "user_1");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_refresh_token_lifetime() {
        let issuer = create_issuer();
        let token = issuer.issue_refresh_token("user_1", "a@x.com").unwrap();

        let claims = issuer.verify(&token, TokenKind::Refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, 30 * 86400);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let issuer = create_issuer();
        let pair = issuer.issue_pair("user_1", "a@x.com").unwrap();

        assert!(matches!(
            issuer.verify(&pair.access_token, TokenKind::Refresh),
            Err(AuthError::TokenMalformed)
        ));
        assert!(matches!(
            issuer.verify(&pair.refresh_token, TokenKind::Access),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = create_issuer();
        let a = issuer.issue_pair("user_1", "a@x.com").unwrap();
        let b = issuer.issue_pair("user_1", "a@x.com").unwrap();
        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn test_expired_is_distinguished() {
        let issuer = create_issuer();
        let token = expired_token(&issuer, TokenKind::Access);
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_malformed_token() {
        let issuer = create_issuer();
        assert!(matches!(
            issuer.verify("invalid.token.here", TokenKind::Access),
            Err(AuthError::TokenMalformed)
        ));
        assert!(matches!(
            issuer.verify("", TokenKind::Refresh),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn test_same_secret_rejected() {
        let result = TokenIssuer::new(
            b"same",
            b"same",
            Duration::from_secs(60),
            Duration::from_secs(120),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_generates_secrets() {
        let issuer = TokenIssuer::from_config(&AuthConfig::default()).unwrap();
        let token = issuer.issue_access_token("u", "u@x.com").unwrap();
        assert!(issuer.verify(&token, TokenKind::Access).is_ok());
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(
            TokenIssuer::extract_from_header("Bearer abc123"),
            Some("abc123")
        );
        assert_eq!(
            TokenIssuer::extract_from_header("bearer abc123"),
            Some("abc123")
        );
        assert_eq!(TokenIssuer::extract_from_header("abc123"), None);
        assert_eq!(TokenIssuer::extract_from_header("Bearer "), None);
    }
}
