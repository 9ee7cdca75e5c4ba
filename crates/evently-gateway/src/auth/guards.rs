//! Per-route authorization.
//!
//! Each protected route carries a [`RoutePolicy`] value. The [`enforce`]
//! middleware evaluates it before the handler runs, in this order:
//! public bypass, credential check, role check, ownership check. The first
//! failure short-circuits the request.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use super::{AuthError, AuthService, TokenIssuer, TokenKind, User, UserRole, UserStore};

/// The authenticated caller, attached to the request by [`enforce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// User ID.
    pub id: String,
    /// Email.
    pub email: String,
    /// Role at request time.
    pub role: UserRole,
    /// Creator flag at request time.
    pub is_creator: bool,
}

impl CurrentUser {
    /// Check if the caller is an admin.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            is_creator: user.is_creator,
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::UnauthorizedAccess)
    }
}

/// Verifies one kind of bearer credential.
#[async_trait]
pub trait TokenStrategy: Send + Sync {
    /// Pull the raw token out of the request headers.
    fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(TokenIssuer::extract_from_header)
    }

    /// Resolve the token to a live user.
    async fn verify(&self, auth: &AuthService, token: &str) -> Result<User, AuthError>;

    /// Classify a verification failure for the client.
    ///
    /// Expired and malformed tokens keep their own messages; everything
    /// else becomes the generic "must be logged in".
    fn on_failure(&self, err: AuthError) -> AuthError {
        match err {
            AuthError::TokenExpired | AuthError::TokenMalformed | AuthError::Internal(_) => err,
            _ => AuthError::UnauthorizedAccess,
        }
    }
}

/// Bearer access token, checked for signature, expiry and a live account.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessTokenStrategy;

#[async_trait]
impl TokenStrategy for AccessTokenStrategy {
    async fn verify(&self, auth: &AuthService, token: &str) -> Result<User, AuthError> {
        let claims = auth.issuer().verify(token, TokenKind::Access)?;
        auth.store()
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::UnauthorizedAccess)
    }
}

/// Bearer refresh token, additionally matched against the stored hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshTokenStrategy;

#[async_trait]
impl TokenStrategy for RefreshTokenStrategy {
    async fn verify(&self, auth: &AuthService, token: &str) -> Result<User, AuthError> {
        let claims = auth.issuer().verify(token, TokenKind::Refresh)?;
        auth.validate_refresh_token(&claims.sub, token).await
    }
}

static ACCESS_STRATEGY: AccessTokenStrategy = AccessTokenStrategy;
static REFRESH_STRATEGY: RefreshTokenStrategy = RefreshTokenStrategy;

/// Credential a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// Nothing; the route is public.
    None,
    /// An access token.
    Access,
    /// A refresh token that is still the user's current one.
    Refresh,
}

impl Credential {
    fn strategy(self) -> Option<&'static dyn TokenStrategy> {
        match self {
            Self::None => None,
            Self::Access => Some(&ACCESS_STRATEGY),
            Self::Refresh => Some(&REFRESH_STRATEGY),
        }
    }
}

/// Static access rules for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Required credential.
    pub credential: Credential,
    /// Roles allowed through. `None` allows any authenticated role.
    pub roles: Option<&'static [UserRole]>,
    /// Path parameter naming the owning user. Admins bypass this check.
    pub owner_param: Option<&'static str>,
}

impl RoutePolicy {
    /// No checks at all.
    #[must_use]
    pub const fn public() -> Self {
        Self {
            credential: Credential::None,
            roles: None,
            owner_param: None,
        }
    }

    /// Any valid access token.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            credential: Credential::Access,
            roles: None,
            owner_param: None,
        }
    }

    /// The caller's current refresh token.
    #[must_use]
    pub const fn refresh() -> Self {
        Self {
            credential: Credential::Refresh,
            roles: None,
            owner_param: None,
        }
    }

    /// Restrict to the given roles.
    #[must_use]
    pub const fn roles(mut self, roles: &'static [UserRole]) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Restrict to the user named by `param`, or an admin.
    #[must_use]
    pub const fn owner(mut self, param: &'static str) -> Self {
        self.owner_param = Some(param);
        self
    }

    /// Check whether this policy requires no credential.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self.credential, Credential::None)
    }

    /// Role and ownership checks for an authenticated caller.
    ///
    /// # Errors
    ///
    /// `Forbidden` on the first failed check.
    pub fn authorize(&self, user: &CurrentUser, path_owner: Option<&str>) -> Result<(), AuthError> {
        if self.roles.is_some_and(|roles| !roles.contains(&user.role)) {
            return Err(AuthError::Forbidden);
        }

        if self.owner_param.is_some() && !user.is_admin() && path_owner != Some(user.id.as_str()) {
            return Err(AuthError::Forbidden);
        }

        Ok(())
    }
}

/// Middleware state: the service plus the policy of the guarded route.
#[derive(Clone)]
pub struct PolicyGuard {
    auth: Arc<AuthService>,
    policy: RoutePolicy,
}

impl PolicyGuard {
    /// Bind a policy to a service.
    #[must_use]
    pub const fn new(auth: Arc<AuthService>, policy: RoutePolicy) -> Self {
        Self { auth, policy }
    }
}

async fn path_param(parts: &mut Parts, name: &str) -> Result<String, AuthError> {
    let params = RawPathParams::from_request_parts(parts, &())
        .await
        .map_err(|e| AuthError::Internal(format!("Path parameters unavailable: {e}")))?;

    params
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| AuthError::Internal(format!("Route has no `{name}` parameter")))
}

/// Evaluate the route's policy and attach [`CurrentUser`] on success.
///
/// # Errors
///
/// 401 variants for missing or bad credentials, `Forbidden` for failed
/// role or ownership checks.
pub async fn enforce(
    State(guard): State<PolicyGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(strategy) = guard.policy.credential.strategy() else {
        return Ok(next.run(request).await);
    };

    let (mut parts, body) = request.into_parts();

    let token = strategy
        .extract(&parts.headers)
        .map(str::to_owned)
        .ok_or(AuthError::UnauthorizedAccess)?;

    let user = strategy
        .verify(&guard.auth, &token)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, path = %parts.uri.path(), "Credential rejected");
            strategy.on_failure(e)
        })?;
    let current = CurrentUser::from(&user);

    let path_owner = match guard.policy.owner_param {
        Some(name) => Some(path_param(&mut parts, name).await?),
        None => None,
    };

    if let Err(e) = guard.policy.authorize(&current, path_owner.as_deref()) {
        tracing::debug!(user_id = %current.id, path = %parts.uri.path(), "Access denied");
        return Err(e);
    }

    parts.extensions.insert(current);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use evently_core::config::PasswordHashConfig;
    use tempfile::TempDir;

    use super::*;
    use crate::auth::{PasswordHasher, RegisterRequest, SledUserStore, UserStore};

    fn caller(id: &str, role: UserRole) -> CurrentUser {
        CurrentUser {
            id: id.to_string(),
            email: format!("{id}@x.com"),
            role,
            is_creator: false,
        }
    }

    const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];

    #[test]
    fn test_role_requirement() {
        let policy = RoutePolicy::authenticated().roles(ADMIN_ONLY);
        assert!(matches!(
            policy.authorize(&caller("u1", UserRole::User), None),
            Err(AuthError::Forbidden)
        ));
        assert!(policy.authorize(&caller("u1", UserRole::Admin), None).is_ok());
    }

    #[test]
    fn test_owner_requirement() {
        let policy = RoutePolicy::authenticated().owner("user_id");
        let user = caller("u1", UserRole::User);

        assert!(policy.authorize(&user, Some("u1")).is_ok());
        assert!(matches!(
            policy.authorize(&user, Some("u2")),
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(
            policy.authorize(&user, None),
            Err(AuthError::Forbidden)
        ));
    }

    #[test]
    fn test_admin_overrides_ownership() {
        let policy = RoutePolicy::authenticated().owner("user_id");
        assert!(
            policy
                .authorize(&caller("admin", UserRole::Admin), Some("u2"))
                .is_ok()
        );
    }

    #[test]
    fn test_role_checked_before_ownership() {
        let policy = RoutePolicy::authenticated().roles(ADMIN_ONLY).owner("user_id");
        assert!(matches!(
            policy.authorize(&caller("u1", UserRole::User), Some("u1")),
            Err(AuthError::Forbidden)
        ));
    }

    #[test]
    fn test_policy_constructors() {
        assert!(RoutePolicy::public().is_public());
        assert!(!RoutePolicy::authenticated().is_public());
        assert_eq!(RoutePolicy::refresh().credential, Credential::Refresh);
    }

    #[test]
    fn test_failure_classification() {
        let strategy = AccessTokenStrategy;
        assert!(matches!(
            strategy.on_failure(AuthError::TokenExpired),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            strategy.on_failure(AuthError::TokenMalformed),
            AuthError::TokenMalformed
        ));
        assert!(matches!(
            strategy.on_failure(AuthError::NotFound("User".to_string())),
            AuthError::UnauthorizedAccess
        ));
    }

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(AccessTokenStrategy.extract(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer tok".parse().unwrap());
        assert_eq!(AccessTokenStrategy.extract(&headers), Some("tok"));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(RefreshTokenStrategy.extract(&headers), None);
    }

    fn service() -> (TempDir, AuthService) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SledUserStore::open(dir.path()).unwrap());
        let hasher = PasswordHasher::new(&PasswordHashConfig::minimal()).unwrap();
        let issuer = TokenIssuer::new(
            b"guard-access",
            b"guard-refresh",
            Duration::from_secs(60),
            Duration::from_secs(600),
        )
        .unwrap();
        (dir, AuthService::new(store, hasher, issuer).unwrap())
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            name: "Guard".to_string(),
            email: "guard@x.com".to_string(),
            password: "Password123!".to_string(),
        }
    }

    #[tokio::test]
    async fn test_strategies_resolve_users() {
        let (_dir, auth) = service();
        let session = auth.register(register_request()).await.unwrap();

        let user = AccessTokenStrategy
            .verify(&auth, &session.access_token)
            .await
            .unwrap();
        assert_eq!(user.id, session.user.id);

        let user = RefreshTokenStrategy
            .verify(&auth, &session.refresh_token)
            .await
            .unwrap();
        assert_eq!(user.id, session.user.id);

        assert!(
            AccessTokenStrategy
                .verify(&auth, &session.refresh_token)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_refresh_strategy_rejects_superseded() {
        let (_dir, auth) = service();
        let session = auth.register(register_request()).await.unwrap();
        auth.refresh_tokens(&session.user.id).await.unwrap();

        let result = RefreshTokenStrategy
            .verify(&auth, &session.refresh_token)
            .await;
        assert!(matches!(result, Err(AuthError::UnauthorizedAccess)));
    }

    #[tokio::test]
    async fn test_deleted_account_rejected() {
        let (_dir, auth) = service();
        let session = auth.register(register_request()).await.unwrap();
        auth.store().delete(&session.user.id).await.unwrap();

        let result = AccessTokenStrategy
            .verify(&auth, &session.access_token)
            .await;
        assert!(matches!(result, Err(AuthError::UnauthorizedAccess)));
    }
}
