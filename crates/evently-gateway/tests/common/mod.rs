//! Shared harness for router tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use evently_core::Config;
use evently_core::config::PasswordHashConfig;
use chrono::Utc;
use evently_gateway::auth::{Claims, OAuthProvider, UserUpdate};
use evently_gateway::{Gateway, GatewayBuilder, UserRole, UserStore};
use serde_json::{Value, json};
use jsonwebtoken::{EncodingKey, Header, encode};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Password123!";
pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";

pub struct TestApp {
    _dir: TempDir,
    pub gateway: Gateway,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.gateway.data_dir = Some(dir.path().to_path_buf());
    config.auth.access_secret = Some(ACCESS_SECRET.to_string());
    config.auth.refresh_secret = Some(REFRESH_SECRET.to_string());
    config.auth.password_hash = PasswordHashConfig::minimal();
    config.auth.login_rate_limit_per_minute = 1000;
    config.oauth.frontend_url = "http://front.test".to_string();
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(|config| config, None)
    }

    pub fn with_rate_limit(per_minute: u32) -> Self {
        Self::build(
            |mut config| {
                config.auth.login_rate_limit_per_minute = per_minute;
                config
            },
            None,
        )
    }

    pub fn with_provider(provider: Arc<dyn OAuthProvider>) -> Self {
        Self::build(|config| config, Some(provider))
    }

    fn build(
        adjust: impl FnOnce(Config) -> Config,
        provider: Option<Arc<dyn OAuthProvider>>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let mut builder = GatewayBuilder::new().with_config(adjust(test_config(&dir)));
        if let Some(provider) = provider {
            builder = builder.with_oauth_provider(provider);
        }
        let gateway = builder.build().unwrap();
        let router = gateway.router();
        Self {
            _dir: dir,
            gateway,
            router,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.request_with_headers(method, uri, token, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        self.request(Method::POST, uri, token, body).await
    }

    /// Register a user and return the response body.
    pub async fn register(&self, name: &str, email: &str) -> Value {
        let response = self
            .post(
                "/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn promote_to_admin(&self, user_id: &str) {
        self.gateway
            .state()
            .auth
            .store()
            .update(
                user_id,
                UserUpdate {
                    role: Some(UserRole::Admin),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
    }
}

/// Sign a token for `user_id` that expired a minute ago.
pub fn expired_token(secret: &str, user_id: &str, email: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now - 120,
        exp: now - 60,
        jti: Uuid::new_v4().to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn user_id(session: &Value) -> String {
    session["user"]["id"].as_str().unwrap().to_string()
}

pub fn access_token(session: &Value) -> String {
    session["access_token"].as_str().unwrap().to_string()
}

pub fn refresh_token(session: &Value) -> String {
    session["refresh_token"].as_str().unwrap().to_string()
}

/// Assert the uniform error envelope.
pub fn assert_envelope(response: &TestResponse, status: StatusCode, path: &str) {
    assert_eq!(response.status, status, "{}", response.body);
    let body = &response.body;
    assert_eq!(body["statusCode"], status.as_u16());
    assert_eq!(body["path"], path);
    assert_eq!(body["error"], status.canonical_reason().unwrap());
    assert!(body["message"].is_string());
    assert!(body["timestamp"].is_string());
}
