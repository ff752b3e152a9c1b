// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted entities (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::statemachine::ChallengeState;

/// A user account. Created by the external identity collaborator
/// ([`crate::auth`] in this implementation); push tokens mutated only by
/// [`crate::push`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(json)]
    pub push_tokens: sqlx::types::Json<Vec<PushToken>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single registered push-delivery token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken {
    pub token: String,
    #[serde(default)]
    pub platform: Option<String>,
}

/// The offer from one user to another to begin a shared session (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: Uuid,
    pub challenger_id: Uuid,
    pub challenged_id: Uuid,
    pub game_type: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub metadata: sqlx::types::Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Challenge {
    pub fn state(&self) -> ChallengeState {
        self.state.parse().unwrap_or(ChallengeState::Expired)
    }
}

/// The post-handshake durable record representing an agreed-upon meeting
/// between the two users (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub player_a: Uuid,
    pub player_b: Uuid,
    pub state: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub metadata: sqlx::types::Json<serde_json::Value>,
}

impl Session {
    pub fn players(&self) -> [Uuid; 2] {
        [self.player_a, self.player_b]
    }

    pub fn opponent_of(&self, user: Uuid) -> Option<Uuid> {
        if self.player_a == user {
            Some(self.player_b)
        } else if self.player_b == user {
            Some(self.player_a)
        } else {
            None
        }
    }
}

/// Session lifecycle state (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    Completed,
    Abandoned,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = crate::error::HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "ABANDONED" => Ok(Self::Abandoned),
            other => {
                Err(crate::error::HandshakeError::Validation(format!("invalid session state: {other}")))
            }
        }
    }
}
