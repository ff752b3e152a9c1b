// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::Challenge;
use crate::error::HandshakeError;
use crate::statemachine::{guard_transition, ChallengeState};

/// Repository over the `challenges` table. The only place the `state`
/// column is written (spec §4.3): every mutation goes through
/// [`ChallengeRepo::update_state`], which enforces the transition table
/// with a row-level `WHERE state = $expected` guard so a racing writer
/// observes `Conflict` rather than clobbering a concurrent transition.
#[derive(Clone)]
pub struct ChallengeRepo {
    pool: PgPool,
}

impl ChallengeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        challenger_id: Uuid,
        challenged_id: Uuid,
        game_type: &str,
        expires_at: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Result<Challenge, HandshakeError> {
        sqlx::query_as::<_, Challenge>(
            r#"
            INSERT INTO challenges
                (id, challenger_id, challenged_id, game_type, state, expires_at,
                 attempts, last_attempt_at, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, NULL, $7, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(challenger_id)
        .bind(challenged_id)
        .bind(game_type)
        .bind(ChallengeState::Pending.as_str())
        .bind(expires_at)
        .bind(sqlx::types::Json(metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get(&self, id: Uuid) -> Result<Challenge, HandshakeError> {
        sqlx::query_as::<_, Challenge>("SELECT * FROM challenges WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_pending_for_user(&self, user_id: Uuid) -> Result<Vec<Challenge>, HandshakeError> {
        sqlx::query_as::<_, Challenge>(
            "SELECT * FROM challenges WHERE challenged_id = $1 AND state = $2 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(ChallengeState::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Transition `id` from its current state to `to`, guarded both in Rust
    /// (the transition table) and at the row level (`WHERE state = $expected`).
    /// Must be called while holding the per-challenge distributed lock
    /// (spec §4.7).
    pub async fn update_state(
        &self,
        id: Uuid,
        from: ChallengeState,
        to: ChallengeState,
    ) -> Result<Challenge, HandshakeError> {
        guard_transition(from, to)?;

        let updated = sqlx::query_as::<_, Challenge>(
            r#"
            UPDATE challenges
            SET state = $1, updated_at = now()
            WHERE id = $2 AND state = $3
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            HandshakeError::Conflict(format!(
                "challenge {id} was not in state {from} when transitioning to {to}"
            ))
        })
    }

    /// Increment the wake-up attempt counter and stamp `last_attempt_at`.
    /// Spec invariant: `attempts <= MaxAttempts` always — enforced by the
    /// caller (the Orchestrator) before scheduling another attempt.
    pub async fn increment_attempt(&self, id: Uuid) -> Result<Challenge, HandshakeError> {
        sqlx::query_as::<_, Challenge>(
            r#"
            UPDATE challenges
            SET attempts = attempts + 1, last_attempt_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    /// Move expired `PENDING` challenges to `EXPIRED`. Races with
    /// `InitiateHandshake` are resolved by the `WHERE state = 'PENDING'`
    /// clause: a challenge already moved to `NOTIFYING` is excluded.
    pub async fn mark_expired(&self) -> Result<u64, HandshakeError> {
        let result = sqlx::query(
            "UPDATE challenges SET state = $1, updated_at = now() WHERE state = $2 AND expires_at < now()",
        )
        .bind(ChallengeState::Expired.as_str())
        .bind(ChallengeState::Pending.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Prune terminal challenges older than `days` (spec §3: "terminal
    /// challenges older than a configured retention window are pruned").
    pub async fn delete_terminal_older_than(&self, days: i64) -> Result<u64, HandshakeError> {
        let result = sqlx::query(
            r#"
            DELETE FROM challenges
            WHERE state IN ($1, $2, $3, $4) AND updated_at < now() - make_interval(days => $5)
            "#,
        )
        .bind(ChallengeState::Active.as_str())
        .bind(ChallengeState::Declined.as_str())
        .bind(ChallengeState::Timeout.as_str())
        .bind(ChallengeState::Expired.as_str())
        .bind(days as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
