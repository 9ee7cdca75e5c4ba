//! Gateway middleware.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};

use crate::auth::AuthError;

/// How often idle client entries are dropped from the limiter.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Per-client rate limiter for credential endpoints.
pub struct GatewayRateLimiter {
    client_limiter: RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    trusted_proxies: Vec<IpAddr>,
}

impl GatewayRateLimiter {
    /// Create a new rate limiter that keys clients by peer address.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            client_limiter: RateLimiter::keyed(quota),
            trusted_proxies: Vec::new(),
        }
    }

    /// Believe `X-Forwarded-For` on requests arriving from these peers.
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    /// Check if a request is allowed.
    #[must_use]
    pub fn check(&self, client_id: &str) -> bool {
        self.client_limiter
            .check_key(&client_id.to_string())
            .is_ok()
    }

    /// Drop clients whose budget has fully refilled.
    pub fn prune(&self) {
        self.client_limiter.retain_recent();
        self.client_limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.client_limiter.len()
    }

    /// Client key for a request.
    ///
    /// The peer address, unless the peer is a trusted proxy that supplied
    /// `X-Forwarded-For`; then the first forwarded hop. `unknown` when the
    /// peer address is not available.
    fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let Some(peer) = peer.map(|addr| addr.ip()) else {
            return "unknown".to_string();
        };

        if self.trusted_proxies.contains(&peer) {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .and_then(|v| v.parse::<IpAddr>().ok());
            if let Some(client) = forwarded {
                return client.to_string();
            }
        }

        peer.to_string()
    }
}

impl Default for GatewayRateLimiter {
    fn default() -> Self {
        Self::new(20)
    }
}

impl std::fmt::Debug for GatewayRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRateLimiter")
            .field("trusted_proxies", &self.trusted_proxies)
            .finish_non_exhaustive()
    }
}

/// Prune the limiter every [`PRUNE_INTERVAL`] until the process exits.
pub fn spawn_pruner(limiter: Arc<GatewayRateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.prune();
            tracing::trace!(clients = limiter.tracked_clients(), "Pruned rate limiter");
        }
    })
}

/// Reject clients over their request budget with 429.
///
/// # Errors
///
/// `TooManyRequests` once the client's quota is used up.
pub async fn rate_limit(
    State(limiter): State<Arc<GatewayRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = limiter.client_key(request.headers(), peer);

    if !limiter.check(&key) {
        tracing::warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        return Err(AuthError::TooManyRequests);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", value.parse().unwrap());
        headers
    }

    #[test]
    fn test_quota_exhausted() {
        let limiter = GatewayRateLimiter::new(2);
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
        assert!(limiter.check("5.6.7.8"));
    }

    #[test]
    fn test_client_key_uses_peer() {
        let limiter = GatewayRateLimiter::new(10);
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();

        assert_eq!(limiter.client_key(&HeaderMap::new(), None), "unknown");
        assert_eq!(limiter.client_key(&HeaderMap::new(), Some(peer)), "10.0.0.1");
        assert_eq!(
            limiter.client_key(&forwarded("203.0.113.7"), Some(peer)),
            "10.0.0.1"
        );
        assert_eq!(limiter.client_key(&forwarded("203.0.113.7"), None), "unknown");
    }

    #[test]
    fn test_client_key_behind_trusted_proxy() {
        let proxy: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let limiter =
            GatewayRateLimiter::new(10).with_trusted_proxies(vec![proxy.ip()]);

        assert_eq!(
            limiter.client_key(&forwarded("203.0.113.7, 10.0.0.1"), Some(proxy)),
            "203.0.113.7"
        );
        assert_eq!(
            limiter.client_key(&forwarded("not-an-ip"), Some(proxy)),
            "10.0.0.1"
        );

        let other: SocketAddr = "192.0.2.9:4000".parse().unwrap();
        assert_eq!(
            limiter.client_key(&forwarded("203.0.113.7"), Some(other)),
            "192.0.2.9"
        );
    }

    #[test]
    fn test_rotating_forwarded_header_shares_budget() {
        let limiter = GatewayRateLimiter::new(2);
        let peer: SocketAddr = "192.0.2.9:4000".parse().unwrap();

        let allowed: Vec<bool> = (0..5)
            .map(|i| {
                let key = limiter.client_key(&forwarded(&format!("10.9.9.{i}")), Some(peer));
                limiter.check(&key)
            })
            .collect();
        assert_eq!(allowed, vec![true, true, false, false, false]);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_prune_keeps_limited_clients() {
        let limiter = GatewayRateLimiter::new(1);
        assert!(limiter.check("1.2.3.4"));
        limiter.prune();
        assert!(!limiter.check("1.2.3.4"));
    }
}
