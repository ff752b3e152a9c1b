// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::HandshakeError;
use crate::http::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnregisterDeviceRequest {
    pub token: String,
}

/// `POST /presence/register-device`.
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    state.push.register(user_id, &req.token, req.platform.as_deref()).await?;
    Ok(Json(ApiResponse::<()>::ok(())))
}

/// `POST /presence/unregister-device`.
pub async fn unregister_device(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<UnregisterDeviceRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    state.push.unregister(user_id, &req.token).await?;
    Ok(Json(ApiResponse::<()>::ok(())))
}

/// `POST /presence/heartbeat` → 200 `{now}`.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, HandshakeError> {
    state.presence.heartbeat(user_id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "now": Utc::now() }))))
}

/// `GET /presence/:userId` → 200 `{presence}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandshakeError> {
    let presence = state.presence.snapshot(user_id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "presence": presence }))))
}
