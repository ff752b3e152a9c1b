// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{verify_token, AuthUser};
use crate::error::HandshakeError;
use crate::AppState;

const EXEMPT_PATHS: &[&str] = &["/health", "/auth/register", "/auth/login", "/ws"];

/// Resolve the bearer token into an [`AuthUser`] and insert it as a request
/// extension. Exempt: `/health`, `/auth/register`, `/auth/login`, and `/ws`
/// (the WebSocket upgrade authenticates via its own query-string token,
/// mirroring the teacher's `auth_layer` WS exemption).
pub async fn auth_layer(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if EXEMPT_PATHS.contains(&path) {
        return next.run(req).await;
    }

    match extract_user(&req, &state) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_user(req: &Request, state: &AppState) -> Result<AuthUser, HandshakeError> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(HandshakeError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(HandshakeError::Unauthorized)?;
    let user_id = verify_token(token, &state.config.token_secret)?;
    Ok(AuthUser(user_id))
}

#[cfg(test)]
#[path = "auth_mw_tests.rs"]
mod tests;
