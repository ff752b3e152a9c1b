// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing error taxonomy for the handshake API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Caller-facing error kinds (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    /// A request that is syntactically valid but semantically rejected
    /// (spec §6: self-challenge creation). Kept distinct from
    /// [`Self::Validation`] so the 422 status the HTTP table specifies for
    /// that one case doesn't widen to every 400.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandshakeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Transient(_) => "TRANSIENT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.code().to_owned(), message: self.to_string() }
    }
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_) | Self::Transient(_)) {
            tracing::error!(err = %self, code = self.code(), "request failed");
        }
        let status = self.http_status();
        let body = crate::http::ApiResponse::<()>::err(self.to_error_body());
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for HandshakeError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound("record not found".to_owned()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Conflict("duplicate resource".to_owned())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::Transient(format!("database unavailable: {e}"))
            }
            _ => Self::Internal(format!("database error: {e}")),
        }
    }
}

impl From<redis::RedisError> for HandshakeError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
            Self::Transient(format!("shared store unavailable: {e}"))
        } else {
            Self::Internal(format!("shared store error: {e}"))
        }
    }
}

impl From<reqwest::Error> for HandshakeError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(format!("vendor call failed: {e}"))
    }
}
