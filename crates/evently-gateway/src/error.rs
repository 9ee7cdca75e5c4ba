//! HTTP rendering of [`AuthError`].
//!
//! Every failure leaves the gateway as the same JSON envelope:
//! `{statusCode, timestamp, path, error, message}`. Handlers do not know the
//! request path, so [`attach_request_path`] fills it in on the way out.

use axum::{
    Json,
    body::Body,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::{StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// Uniform error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// HTTP status code.
    pub status_code: u16,
    /// When the error was produced (RFC 3339).
    pub timestamp: String,
    /// Request path.
    pub path: String,
    /// Status reason phrase.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorEnvelope {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            status_code: status.as_u16(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            path: String::new(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        }
    }
}

impl AuthError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials
            | Self::UnauthorizedAccess
            | Self::TokenExpired
            | Self::TokenMalformed => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client.
    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }

        let envelope = ErrorEnvelope::new(status, self.client_message());
        let mut response = (status, Json(envelope.clone())).into_response();
        response.extensions_mut().insert(envelope);
        response
    }
}

/// Fill the `path` field of error envelopes with the request path.
pub async fn attach_request_path(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let Some(envelope) = response.extensions().get::<ErrorEnvelope>().cloned() else {
        return response;
    };
    let envelope = ErrorEnvelope { path, ..envelope };

    let Ok(body) = serde_json::to_vec(&envelope) else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    parts.extensions.insert(envelope);
    Response::from_parts(parts, Body::from(body))
}

/// JSON body extractor whose rejections use the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AuthError::InvalidInput(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Router fallback for unknown paths.
pub async fn not_found() -> AuthError {
    AuthError::NotFound("Route".to_string())
}
