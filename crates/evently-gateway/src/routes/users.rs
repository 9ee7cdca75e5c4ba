//! User management handlers. Access is decided by the route policy.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::auth::{AuthError, CurrentUser, MessageResponse, ProfileUpdate, PublicUser, UserStore};
use crate::error::ValidJson;
use crate::server::GatewayState;

pub(super) async fn list(
    State(state): State<GatewayState>,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    let users = state.auth.store().list().await?;
    Ok(Json(users.iter().map(|u| u.to_public()).collect()))
}

pub(super) async fn show(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> Result<Json<PublicUser>, AuthError> {
    Ok(Json(state.auth.current_user(&user_id).await?))
}

pub(super) async fn update(
    State(state): State<GatewayState>,
    caller: CurrentUser,
    Path(user_id): Path<String>,
    ValidJson(changes): ValidJson<ProfileUpdate>,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state
        .auth
        .update_profile(&user_id, changes, caller.is_admin())
        .await?;
    tracing::info!(user_id = %user_id, by = %caller.id, "Updated user");
    Ok(Json(user))
}

pub(super) async fn remove(
    State(state): State<GatewayState>,
    caller: CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<MessageResponse>, AuthError> {
    if !state.auth.store().delete(&user_id).await? {
        return Err(AuthError::NotFound("User".to_string()));
    }
    let favorites = state.favorites.remove_all_for_user(&user_id)?;

    tracing::info!(user_id = %user_id, by = %caller.id, favorites, "Deleted user");
    Ok(Json(MessageResponse::new("User deleted")))
}
