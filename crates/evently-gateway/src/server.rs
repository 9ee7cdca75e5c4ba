//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::HeaderValue};
use evently_core::Config;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::GatewayError;
use crate::auth::{AuthService, OAuthProvider, OAuthRegistry, SledUserStore, UserStore};
use crate::favorites::FavoriteStore;
use crate::middleware::{GatewayRateLimiter, spawn_pruner};
use crate::routes;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct GatewayState {
    /// Session lifecycle and user store.
    pub auth: Arc<AuthService>,
    /// Favorite events.
    pub favorites: Arc<FavoriteStore>,
    /// Third-party sign-in.
    pub oauth: Arc<OAuthRegistry>,
    /// Rate limiter for the register and login endpoints.
    pub limiter: Arc<GatewayRateLimiter>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("auth", &self.auth)
            .field("oauth", &self.oauth)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: Config,
    state: GatewayState,
}

/// Builder for constructing a Gateway with its dependencies.
pub struct GatewayBuilder {
    config: Config,
    user_store: Option<Arc<dyn UserStore>>,
    providers: Vec<Arc<dyn OAuthProvider>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            user_store: None,
            providers: Vec::new(),
        }
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use a custom user store instead of the sled one.
    #[must_use]
    pub fn with_user_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.user_store = Some(store);
        self
    }

    /// Register an extra OAuth provider, replacing a configured one of the same kind.
    #[must_use]
    pub fn with_oauth_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory, database or auth setup fails.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let data_dir = self.config.gateway.data_dir();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;

        let db = sled::open(data_dir.join("db"))
            .map_err(|e| GatewayError::Server(format!("Failed to open database: {e}")))?;

        let users: Arc<dyn UserStore> = match self.user_store {
            Some(store) => store,
            None => Arc::new(
                SledUserStore::with_db(&db)
                    .map_err(|e| GatewayError::Server(format!("Failed to open user store: {e}")))?,
            ),
        };
        let favorites = FavoriteStore::with_db(&db)
            .map_err(|e| GatewayError::Server(format!("Failed to open favorites: {e}")))?;

        let auth = AuthService::from_config(&self.config.auth, users)
            .map_err(|e| GatewayError::Config(format!("Auth init failed: {e}")))?;

        let mut oauth = OAuthRegistry::from_config(&self.config.oauth, &self.config.gateway);
        for provider in self.providers {
            oauth.register(provider);
        }

        let limiter = GatewayRateLimiter::new(self.config.auth.login_rate_limit_per_minute)
            .with_trusted_proxies(self.config.gateway.trusted_proxies.clone());

        let state = GatewayState {
            auth: Arc::new(auth),
            favorites: Arc::new(favorites),
            oauth: Arc::new(oauth),
            limiter: Arc::new(limiter),
        };

        Ok(Gateway {
            config: self.config,
            state,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Create a gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be built.
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Application router without transport layers.
    #[must_use]
    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn cors(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .config
            .gateway
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if origins.is_empty() {
            cors.allow_origin(Any)
        } else {
            cors.allow_origin(origins)
        }
    }

    /// Run the gateway server until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let app = self
            .router()
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.gateway.timeout_secs,
            )))
            .layer(self.cors())
            .layer(TraceLayer::new_for_http());

        let addr: SocketAddr = format!(
            "{}:{}",
            self.config.gateway.bind_address, self.config.gateway.port
        )
        .parse()
        .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let pruner = spawn_pruner(Arc::clone(&self.state.limiter));
        tracing::info!("Gateway API listening on http://{}", addr);

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;
        pruner.abort();
        served.map_err(|e| GatewayError::Server(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
