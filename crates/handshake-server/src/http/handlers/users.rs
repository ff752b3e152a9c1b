// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::db::models::User;
use crate::error::HandshakeError;
use crate::http::ApiResponse;
use crate::presence::PresenceSnapshot;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserWithPresence {
    #[serde(flatten)]
    pub user: User,
    pub presence: PresenceSnapshot,
}

/// `GET /users` → 200 `{users with presence}` (SPEC_FULL §6 [SUPPLEMENT]).
pub async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, HandshakeError> {
    let users = state.users.list().await?;
    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let presence = state.presence.snapshot(user.id).await?;
        out.push(UserWithPresence { user, presence });
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({ "users": out }))))
}
