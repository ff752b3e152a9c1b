// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface (spec §6): route table and the `{success, data?, error?}`
//! response envelope, generalized from the teacher's `ErrorResponse`.

pub mod auth_mw;
pub mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::ErrorBody;
use crate::AppState;

/// Generic `{success, data?, error?}` response envelope (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    pub fn err(error: ErrorBody) -> Self {
        Self { success: false, data: None, error: Some(error) }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = match state.config.origins() {
        origins if origins.is_empty() => CorsLayer::permissive(),
        origins => {
            let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(parsed)).allow_methods(tower_http::cors::Any)
        }
    };

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/profile", get(handlers::auth::profile))
        .route("/challenges", post(handlers::challenges::create))
        .route("/challenges/me/pending", get(handlers::challenges::list_pending))
        .route("/challenges/{id}", get(handlers::challenges::get))
        .route("/challenges/{id}/accept", post(handlers::challenges::accept))
        .route("/challenges/{id}/decline", post(handlers::challenges::decline))
        .route("/challenges/{id}/respond", post(handlers::challenges::respond))
        .route("/presence/register-device", post(handlers::presence::register_device))
        .route("/presence/unregister-device", post(handlers::presence::unregister_device))
        .route("/presence/heartbeat", post(handlers::presence::heartbeat))
        .route("/presence/{user_id}", get(handlers::presence::get))
        .route("/sessions/me/active", get(handlers::sessions::list_active))
        .route("/sessions/{id}", get(handlers::sessions::get))
        .route("/sessions/{id}/end", post(handlers::sessions::end))
        .route("/users", get(handlers::users::list))
        .route("/ws", get(crate::hub::ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_mw::auth_layer))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
