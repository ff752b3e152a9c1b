// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Session, SessionState};
use crate::error::HandshakeError;

/// Repository over the `sessions` table (spec §4.3). One-to-one with its
/// Challenge; created by the Orchestrator exactly once, when a Challenge
/// transitions to `ACTIVE`.
#[derive(Clone)]
pub struct SessionRepo {
    pool: PgPool,
}

impl SessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        challenge_id: Uuid,
        player_a: Uuid,
        player_b: Uuid,
        metadata: serde_json::Value,
    ) -> Result<Session, HandshakeError> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, challenge_id, player_a, player_b, state, started_at, ended_at, metadata)
            VALUES ($1, $2, $3, $4, $5, now(), NULL, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(challenge_id)
        .bind(player_a)
        .bind(player_b)
        .bind(SessionState::Active.as_str())
        .bind(sqlx::types::Json(metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, HandshakeError> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn get_by_challenge(&self, challenge_id: Uuid) -> Result<Session, HandshakeError> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE challenge_id = $1")
            .bind(challenge_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Session>, HandshakeError> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE (player_a = $1 OR player_b = $1) AND state = $2 ORDER BY started_at DESC",
        )
        .bind(user_id)
        .bind(SessionState::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Write the terminal state of a session at most once.
    pub async fn end(
        &self,
        id: Uuid,
        terminal: SessionState,
        metadata: Option<serde_json::Value>,
    ) -> Result<Session, HandshakeError> {
        if matches!(terminal, SessionState::Active) {
            return Err(HandshakeError::Validation(
                "ACTIVE is not a valid terminal session state".to_owned(),
            ));
        }

        let updated = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET state = $1, ended_at = $2, metadata = COALESCE($3, metadata)
            WHERE id = $4 AND state = $5
            RETURNING *
            "#,
        )
        .bind(terminal.as_str())
        .bind(Utc::now())
        .bind(metadata.map(sqlx::types::Json))
        .bind(id)
        .bind(SessionState::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            HandshakeError::Conflict(format!("session {id} is not ACTIVE, cannot end again"))
        })
    }
}
