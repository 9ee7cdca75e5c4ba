//! Favorite event handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::auth::{AuthError, CurrentUser, MessageResponse, StoreError};
use crate::favorites::Favorite;
use crate::server::GatewayState;
use crate::error::ValidJson;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddFavorite {
    event_id: String,
}

pub(super) async fn list(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Favorite>>, AuthError> {
    Ok(Json(state.favorites.list_for_user(&user_id)?))
}

pub(super) async fn add(
    State(state): State<GatewayState>,
    caller: CurrentUser,
    ValidJson(body): ValidJson<AddFavorite>,
) -> Result<(StatusCode, Json<Favorite>), AuthError> {
    let event_id = body.event_id.trim();
    if event_id.is_empty() || event_id.contains('/') {
        return Err(AuthError::InvalidInput("eventId is invalid".to_string()));
    }

    match state.favorites.add(&caller.id, event_id) {
        Ok(favorite) => Ok((StatusCode::CREATED, Json(favorite))),
        Err(StoreError::Duplicate(_)) => Err(AuthError::Conflict("Favorite".to_string())),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn remove(
    State(state): State<GatewayState>,
    Path((user_id, event_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AuthError> {
    match state.favorites.remove(&user_id, &event_id) {
        Ok(()) => Ok(Json(MessageResponse::new("Favorite removed"))),
        Err(StoreError::NotFound(_)) => Err(AuthError::NotFound("Favorite".to_string())),
        Err(e) => Err(e.into()),
    }
}
