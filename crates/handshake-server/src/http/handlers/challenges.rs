// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::Challenge;
use crate::error::HandshakeError;
use crate::http::ApiResponse;
use crate::orchestrator::RespondOutcome;
use crate::statemachine::WakeUpResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengeRequest {
    pub challenged_id: Uuid,
    pub game_type: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ChallengeListBody {
    pub challenges: Vec<Challenge>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub state: crate::statemachine::ChallengeState,
    pub player_notified: bool,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

/// `POST /challenges` → 201 `{challenge}`.
pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(challenger): AuthUser,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    if req.game_type.trim().is_empty() {
        return Err(HandshakeError::Validation("gameType is required".to_owned()));
    }
    let challenge = state
        .orchestrator
        .create_challenge(
            challenger,
            req.challenged_id,
            &req.game_type,
            req.metadata.unwrap_or(serde_json::Value::Null),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(serde_json::json!({ "challenge": challenge })))))
}

/// `GET /challenges/me/pending` → 200 `{challenges, count}`.
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, HandshakeError> {
    let challenges = state.challenges.list_pending_for_user(user_id).await?;
    let count = challenges.len();
    Ok(Json(ApiResponse::ok(ChallengeListBody { challenges, count })))
}

/// `GET /challenges/:id` → 200 `{challenge}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandshakeError> {
    let challenge = state.challenges.get(id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "challenge": challenge }))))
}

/// `POST /challenges/:id/accept` → 200 `{state, playerNotified}`.
pub async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, HandshakeError> {
    let result = state.orchestrator.initiate_handshake(id, user_id).await?;
    Ok(Json(ApiResponse::ok(AcceptBody { state: result.state, player_notified: result.player_notified })))
}

/// `POST /challenges/:id/decline` (challenged declines before acceptance).
pub async fn decline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, HandshakeError> {
    state.orchestrator.decline_by_challenged(id, user_id).await?;
    Ok(Json(ApiResponse::<()>::ok(())))
}

/// `POST /challenges/:id/respond` — the challenger's wake-up response.
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    let response = WakeUpResponse::from_str(&req.response)?;
    let outcome = state.orchestrator.handle_wake_up_response(id, user_id, response).await?;
    let body = match outcome {
        RespondOutcome::SessionCreated { session_id } => {
            RespondBody { action: "SESSION_CREATED", session_id: Some(session_id) }
        }
        RespondOutcome::Declined => RespondBody { action: "DECLINED", session_id: None },
    };
    Ok(Json(ApiResponse::ok(body)))
}
