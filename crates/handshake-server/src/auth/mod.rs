// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity resolver stand-in (SPEC_FULL.md §1 [SUPPLEMENT]): password
//! hashing and bearer-token mint/verify. Kept decoupled behind free
//! functions and an axum extractor so the Orchestrator and Hub only ever
//! see a resolved user id, never a raw token.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HandshakeError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, HandshakeError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| HandshakeError::Internal(format!("password hash failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, HandshakeError> {
    bcrypt::verify(password, hash)
        .map_err(|e| HandshakeError::Internal(format!("password verify failed: {e}")))
}

pub fn mint_token(
    user_id: Uuid,
    secret: &str,
    lifetime: ChronoDuration,
) -> Result<String, HandshakeError> {
    let claims = Claims { sub: user_id, exp: (Utc::now() + lifetime).timestamp() };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| HandshakeError::Internal(format!("token mint failed: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, HandshakeError> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| HandshakeError::Unauthorized)?;
    Ok(data.claims.sub)
}

/// A resolved, authenticated caller. Handlers extract this instead of
/// touching tokens directly.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = HandshakeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(HandshakeError::Unauthorized)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
