//! Session and provider sign-in handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::auth::{
    AuthError, AuthResponse, CurrentUser, LoginRequest, MessageResponse, PublicUser,
    RegisterRequest, TokenPair,
};
use crate::error::ValidJson;
use crate::server::GatewayState;

/// 302 to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

pub(super) async fn register(
    State(state): State<GatewayState>,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub(super) async fn login(
    State(state): State<GatewayState>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(response))
}

pub(super) async fn refresh(
    State(state): State<GatewayState>,
    user: CurrentUser,
) -> Result<Json<TokenPair>, AuthError> {
    Ok(Json(state.auth.refresh_tokens(&user.id).await?))
}

pub(super) async fn logout(
    State(state): State<GatewayState>,
    user: CurrentUser,
) -> Result<Json<MessageResponse>, AuthError> {
    Ok(Json(state.auth.logout(&user.id).await?))
}

#[derive(Serialize)]
pub(super) struct MeResponse {
    user: PublicUser,
}

pub(super) async fn me(
    State(state): State<GatewayState>,
    user: CurrentUser,
) -> Result<Json<MeResponse>, AuthError> {
    let user = state.auth.current_user(&user.id).await?;
    Ok(Json(MeResponse { user }))
}

pub(super) async fn oauth_start(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
) -> Result<Response, AuthError> {
    let url = state.oauth.begin(&provider).await?;
    Ok(found(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub(super) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub(super) async fn oauth_callback(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AuthError> {
    let provider = state.oauth.get(&provider)?;

    if let Some(error) = &params.error {
        tracing::info!(provider = %provider.kind(), error = %error, "Provider login declined");
        return Ok(found(&state.oauth.failure_redirect()));
    }

    let (Some(code), Some(csrf)) = (params.code, params.state) else {
        return Ok(found(&state.oauth.failure_redirect()));
    };

    if !state.oauth.states().consume(&csrf).await {
        tracing::warn!(provider = %provider.kind(), "Unknown or expired OAuth state");
        return Ok(found(&state.oauth.failure_redirect()));
    }

    let session = match provider.exchange(&code).await {
        Ok(profile) => state.auth.login_oauth(profile).await,
        Err(e) => Err(e),
    };

    match session {
        Ok(session) => {
            let pair = TokenPair {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            };
            Ok(found(&state.oauth.success_redirect(&pair)))
        }
        Err(e) => {
            tracing::warn!(provider = %provider.kind(), error = %e, "Provider login failed");
            Ok(found(&state.oauth.failure_redirect()))
        }
    }
}
