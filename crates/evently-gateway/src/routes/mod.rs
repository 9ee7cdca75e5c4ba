//! HTTP routes.
//!
//! Policies are attached per route with [`guarded`], so reading this module
//! top to bottom gives the full access table.

mod auth;
mod favorites;
mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{MethodRouter, delete, get, post},
};
use serde::Serialize;

use crate::auth::{PolicyGuard, RoutePolicy, UserRole, enforce};
use crate::error::{attach_request_path, not_found};
use crate::middleware::rate_limit;
use crate::server::GatewayState;

const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];

/// Wrap a method router with a route policy.
fn guarded(
    route: MethodRouter<GatewayState>,
    state: &GatewayState,
    policy: RoutePolicy,
) -> MethodRouter<GatewayState> {
    if policy.is_public() {
        return route;
    }
    let guard = PolicyGuard::new(Arc::clone(&state.auth), policy);
    route.route_layer(from_fn_with_state(guard, enforce))
}

/// Wrap a method router with the credential endpoint rate limit.
fn limited(route: MethodRouter<GatewayState>, state: &GatewayState) -> MethodRouter<GatewayState> {
    route.route_layer(from_fn_with_state(Arc::clone(&state.limiter), rate_limit))
}

/// Build the complete application router.
pub fn router(state: GatewayState) -> Router {
    let owner = RoutePolicy::authenticated().owner("user_id");

    Router::new()
        .route("/health", get(health))
        // Sessions
        .route("/auth/register", limited(post(auth::register), &state))
        .route("/auth/login", limited(post(auth::login), &state))
        .route(
            "/auth/refresh",
            guarded(post(auth::refresh), &state, RoutePolicy::refresh()),
        )
        .route(
            "/auth/logout",
            guarded(post(auth::logout), &state, RoutePolicy::authenticated()),
        )
        .route(
            "/auth/me",
            guarded(get(auth::me), &state, RoutePolicy::authenticated()),
        )
        // Provider sign-in
        .route(
            "/auth/{provider}",
            guarded(get(auth::oauth_start), &state, RoutePolicy::public()),
        )
        .route(
            "/auth/{provider}/callback",
            guarded(get(auth::oauth_callback), &state, RoutePolicy::public()),
        )
        // Users
        .route(
            "/users",
            guarded(
                get(users::list),
                &state,
                RoutePolicy::authenticated().roles(ADMIN_ONLY),
            ),
        )
        .route(
            "/users/{user_id}",
            guarded(
                get(users::show).patch(users::update).delete(users::remove),
                &state,
                owner,
            ),
        )
        // Favorites
        .route(
            "/user-favorites",
            guarded(post(favorites::add), &state, RoutePolicy::authenticated()),
        )
        .route(
            "/user-favorites/user/{user_id}",
            guarded(get(favorites::list), &state, owner),
        )
        .route(
            "/user-favorites/user/{user_id}/event/{event_id}",
            guarded(delete(favorites::remove), &state, owner),
        )
        .fallback(not_found)
        .layer(from_fn(attach_request_path))
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
