// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::http::ApiResponse;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: String,
    pub uptime: u64,
}

/// `GET /health` — no auth required.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    Json(ApiResponse::ok(HealthBody { status: "ok".to_owned(), uptime }))
}
