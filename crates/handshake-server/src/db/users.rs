// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{PushToken, User};
use crate::error::HandshakeError;

/// Repository over the `users` table.
#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, HandshakeError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, push_tokens, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, '[]'::jsonb, true, now(), now())
            RETURNING id, username, email, password_hash, push_tokens, active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<User, HandshakeError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn try_get_by_id(&self, id: Uuid) -> Result<Option<User>, HandshakeError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, HandshakeError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list(&self) -> Result<Vec<User>, HandshakeError> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// Append a push token. Idempotent per spec §8: "Registering the same
    /// push token twice leaves the token list unchanged after the second call."
    pub async fn add_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Option<&str>,
    ) -> Result<(), HandshakeError> {
        let user = self.get_by_id(user_id).await?;
        let mut tokens = user.push_tokens.0;
        if tokens.iter().any(|t| t.token == token) {
            return Ok(());
        }
        tokens.push(PushToken { token: token.to_owned(), platform: platform.map(str::to_owned) });

        sqlx::query("UPDATE users SET push_tokens = $1, updated_at = now() WHERE id = $2")
            .bind(sqlx::types::Json(&tokens))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_push_token(&self, user_id: Uuid, token: &str) -> Result<(), HandshakeError> {
        let user = self.get_by_id(user_id).await?;
        let tokens: Vec<PushToken> =
            user.push_tokens.0.into_iter().filter(|t| t.token != token).collect();

        sqlx::query("UPDATE users SET push_tokens = $1, updated_at = now() WHERE id = $2")
            .bind(sqlx::types::Json(&tokens))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace the full push-token list. Used by the Push Channel's
    /// dead-token sweep (spec §4.4).
    pub async fn set_push_tokens(
        &self,
        user_id: Uuid,
        tokens: &[PushToken],
    ) -> Result<(), HandshakeError> {
        sqlx::query("UPDATE users SET push_tokens = $1, updated_at = now() WHERE id = $2")
            .bind(sqlx::types::Json(tokens))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
