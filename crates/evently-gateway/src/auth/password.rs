//! One-way salted hashing for passwords and refresh tokens.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier as _, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use evently_core::config::PasswordHashConfig;

use super::AuthError;

/// Argon2id hasher with configurable cost.
///
/// The same hasher protects account passwords and the refresh token kept
/// at rest, so a database leak exposes neither.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Create a hasher with the given cost parameters.
    ///
    /// # Errors
    ///
    /// Returns error if argon2 rejects the parameters.
    pub fn new(cost: &PasswordHashConfig) -> Result<Self, AuthError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AuthError::Internal(format!("Invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret into a PHC string with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Internal(format!("Hashing failed: {e}")))
    }

    /// Check a secret against a stored digest.
    ///
    /// Malformed digests never match.
    #[must_use]
    pub fn verify(&self, secret: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    /// [`hash`](Self::hash) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails or the task panics.
    pub async fn hash_blocking(&self, secret: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| AuthError::Internal(format!("Hash task failed: {e}")))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool.
    pub async fn verify_blocking(&self, secret: String, digest: String) -> bool {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &digest))
            .await
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("memory_kib", &self.params.m_cost())
            .field("iterations", &self.params.t_cost())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&PasswordHashConfig::minimal()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let digest = hasher.hash("Password123!").unwrap();

        assert_ne!(digest, "Password123!");
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("Password123!", &digest));
        assert!(!hasher.verify("password123!", &digest));
    }

    #[test]
    fn test_salt_is_random() {
        let hasher = hasher();
        let a = hasher.hash("same").unwrap();
        let b = hasher.hash("same").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("same", &a));
        assert!(hasher.verify("same", &b));
    }

    #[test]
    fn test_malformed_digest_never_matches() {
        let hasher = hasher();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("", ""));
    }

    #[test]
    fn test_verify_across_cost_changes() {
        let digest = hasher().hash("Secret1!").unwrap();
        let stronger = PasswordHasher::new(&PasswordHashConfig {
            memory_kib: 64,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(stronger.verify("Secret1!", &digest));
    }

    #[test]
    fn test_invalid_params() {
        let result = PasswordHasher::new(&PasswordHashConfig {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hasher = hasher();
        let digest = hasher.hash_blocking("Token".to_string()).await.unwrap();
        assert!(hasher.verify_blocking("Token".to_string(), digest.clone()).await);
        assert!(!hasher.verify_blocking("Other".to_string(), digest).await);
    }
}
