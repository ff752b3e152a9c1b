// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::{Session, SessionState};
use crate::error::HandshakeError;
use crate::http::ApiResponse;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SessionListBody {
    pub sessions: Vec<Session>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub state: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// `GET /sessions/me/active` → 200 `{sessions, count}`.
pub async fn list_active(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, HandshakeError> {
    let sessions = state.sessions.list_active_for_user(user_id).await?;
    let count = sessions.len();
    Ok(Json(ApiResponse::ok(SessionListBody { sessions, count })))
}

/// `GET /sessions/:id` → 200 `{session}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandshakeError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "session": session }))))
}

/// `POST /sessions/:id/end` → 200 `{session}`.
pub async fn end(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<EndSessionRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    let session = state.sessions.get(id).await?;
    if session.opponent_of(user_id).is_none() {
        return Err(HandshakeError::Forbidden);
    }
    let terminal = SessionState::from_str(&req.state)?;
    let session = state.orchestrator.end_session(id, terminal, req.metadata).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "session": session }))))
}
