// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, mint_token, verify_password, AuthUser};
use crate::db::models::User;
use crate::error::HandshakeError;
use crate::http::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthBody {
    pub user: User,
    pub token: String,
}

/// `POST /auth/register` → 201 `{user, token}`.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    if req.password.len() < 6 {
        return Err(HandshakeError::Validation("password must be at least 6 characters".to_owned()));
    }
    if req.username.trim().is_empty() || req.email.trim().is_empty() {
        return Err(HandshakeError::Validation("username and email are required".to_owned()));
    }

    let hash = hash_password(&req.password)?;
    let user = state.users.create(&req.username, &req.email, &hash).await?;
    let token = mint_token(user.id, &state.config.token_secret, state.config.token_lifetime())?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(AuthBody { user, token }))))
}

/// `POST /auth/login` → 200 `{user, token}`.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandshakeError> {
    let user = state
        .users
        .get_by_email(&req.email)
        .await
        .map_err(|_| HandshakeError::Unauthorized)?;
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(HandshakeError::Unauthorized);
    }
    let token = mint_token(user.id, &state.config.token_secret, state.config.token_lifetime())?;
    Ok(Json(ApiResponse::ok(AuthBody { user, token })))
}

/// `GET /auth/profile` → 200 `{user}`.
pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, HandshakeError> {
    let user = state.users.get_by_id(user_id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "user": user }))))
}
