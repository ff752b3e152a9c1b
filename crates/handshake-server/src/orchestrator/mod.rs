// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake Orchestrator (spec §4.8): the top-level use cases. Composes
//! every lower component through injected `Arc`s/clones (Design Note:
//! "construct one instance per process at startup and pass it explicitly
//! through a... services aggregate").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::db::challenges::ChallengeRepo;
use crate::db::models::{Challenge, SessionState};
use crate::db::sessions::SessionRepo;
use crate::db::users::UserRepo;
use crate::error::HandshakeError;
use crate::hub::ConnectionHub;
use crate::presence::PresenceRegistry;
use crate::push::{PushChannel, PushPayload};
use crate::scheduler::Scheduler;
use crate::statemachine::{ChallengeState, WakeUpResponse};

pub struct InitiateResult {
    pub state: ChallengeState,
    pub player_notified: bool,
}

pub enum RespondOutcome {
    SessionCreated { session_id: Uuid },
    Declined,
}

fn lock_key(challenge_id: Uuid) -> String {
    format!("lock:challenge:{challenge_id}")
}

/// How many times to retry a contended `try_lock` before giving up. The
/// per-challenge lock is only ever held across a single short
/// read-validate-write region (spec §4.1's "suspension points" guidance),
/// so a handful of short sleeps covers the ordinary case of losing a race
/// to a concurrent caller rather than a genuinely stuck lock.
const LOCK_ACQUIRE_RETRIES: u32 = 4;
const LOCK_ACQUIRE_BACKOFF: Duration = Duration::from_millis(15);

/// Spec §3 invariant: challenger and challenged must differ. Split out as a
/// pure function so it's testable without standing up the full services
/// aggregate.
fn validate_distinct_players(challenger: Uuid, challenged: Uuid) -> Result<(), HandshakeError> {
    if challenger == challenged {
        Err(HandshakeError::Unprocessable("cannot challenge yourself".to_owned()))
    } else {
        Ok(())
    }
}

pub struct Orchestrator {
    pub users: UserRepo,
    pub challenges: ChallengeRepo,
    pub sessions: SessionRepo,
    pub shared_store: crate::shared_store::SharedStore,
    pub presence: PresenceRegistry,
    pub hub: Arc<ConnectionHub>,
    pub push: Arc<PushChannel>,
    pub scheduler: Scheduler,
    pub config: Config,
}

impl Orchestrator {
    /// Acquire `lock`, retrying briefly on contention. If every attempt
    /// loses the race, re-reads the challenge: a caller who lost the lock
    /// because a concurrent writer already moved the challenge off
    /// `expected_state` gets `Conflict` (spec §7: "transition-table
    /// violations [map] to Conflict"), matching S6's expectation that the
    /// loser of a concurrent accept sees 409, not a bare lock-busy 503.
    /// Only a lock still held by a writer that hasn't yet transitioned the
    /// state — or a genuinely wedged lock — falls through to `Transient`.
    async fn acquire_lock_or_conflict(
        &self,
        lock: &str,
        challenge_id: Uuid,
        expected_state: ChallengeState,
    ) -> Result<(), HandshakeError> {
        let ttl = self.config.lock_ttl();
        for attempt in 0..=LOCK_ACQUIRE_RETRIES {
            if self.shared_store.try_lock(lock, ttl).await? {
                return Ok(());
            }
            if attempt < LOCK_ACQUIRE_RETRIES {
                tokio::time::sleep(LOCK_ACQUIRE_BACKOFF).await;
            }
        }

        let challenge = self.challenges.get(challenge_id).await?;
        if challenge.state() != expected_state {
            Err(HandshakeError::Conflict(format!(
                "challenge {challenge_id} is not {expected_state}"
            )))
        } else {
            Err(HandshakeError::Transient(format!("lock unavailable for {challenge_id}")))
        }
    }

    /// As [`Self::acquire_lock_or_conflict`], but for call sites where
    /// losing the race to a concurrent writer is an expected, silent
    /// no-op rather than a caller-facing error (spec §4.8's
    /// `HandleTimeout`: "if state is not WAITING_RESPONSE, returns
    /// quietly — another path won the race"). Returns `Ok(false)` for
    /// that quiet case, `Ok(true)` once the lock is held, `Err(Transient)`
    /// if the lock is still contended and the state hasn't moved.
    async fn acquire_lock_or_quiet(
        &self,
        lock: &str,
        challenge_id: Uuid,
        expected_state: ChallengeState,
    ) -> Result<bool, HandshakeError> {
        let ttl = self.config.lock_ttl();
        for attempt in 0..=LOCK_ACQUIRE_RETRIES {
            if self.shared_store.try_lock(lock, ttl).await? {
                return Ok(true);
            }
            if attempt < LOCK_ACQUIRE_RETRIES {
                tokio::time::sleep(LOCK_ACQUIRE_BACKOFF).await;
            }
        }

        let challenge = self.challenges.get(challenge_id).await?;
        if challenge.state() != expected_state {
            Ok(false)
        } else {
            Err(HandshakeError::Transient(format!("lock unavailable for {challenge_id}")))
        }
    }

    /// **CreateChallenge(challenger, challenged, gameType, metadata)**.
    pub async fn create_challenge(
        &self,
        challenger: Uuid,
        challenged: Uuid,
        game_type: &str,
        metadata: serde_json::Value,
    ) -> Result<Challenge, HandshakeError> {
        validate_distinct_players(challenger, challenged)?;
        self.users.try_get_by_id(challenger).await?.ok_or_else(|| {
            HandshakeError::NotFound(format!("challenger {challenger} not found"))
        })?;
        let challenged_user = self
            .users
            .try_get_by_id(challenged)
            .await?
            .ok_or_else(|| HandshakeError::NotFound(format!("challenged user {challenged} not found")))?;

        let expires_at = Utc::now() + self.config.challenge_expiration();
        let challenge =
            self.challenges.create(challenger, challenged, game_type, expires_at, metadata).await?;

        let payload = json!({
            "challengeId": challenge.id,
            "challenger": challenger,
            "gameType": game_type,
            "createdAt": challenge.created_at,
        });
        if let Err(e) = self.hub.emit(challenged, "challenge:received", payload.clone()).await {
            tracing::warn!(challenge_id = %challenge.id, err = %e, "live notify failed");
        }
        self.push
            .send(
                challenged,
                &PushPayload {
                    title: "New challenge".to_owned(),
                    body: format!("{} challenged you to {game_type}", challenged_user.username),
                    challenge_id: Some(challenge.id),
                    event: "challenge:received".to_owned(),
                },
            )
            .await;

        Ok(challenge)
    }

    /// **InitiateHandshake(challengeId, acceptedBy)**.
    pub async fn initiate_handshake(
        self: &Arc<Self>,
        challenge_id: Uuid,
        accepted_by: Uuid,
    ) -> Result<InitiateResult, HandshakeError> {
        let challenge = self.challenges.get(challenge_id).await?;
        if challenge.state() != ChallengeState::Pending {
            return Err(HandshakeError::Conflict(format!(
                "challenge {challenge_id} is not PENDING"
            )));
        }
        if accepted_by != challenge.challenged_id {
            return Err(HandshakeError::Forbidden);
        }

        let lock = lock_key(challenge_id);

        self.acquire_lock_or_conflict(&lock, challenge_id, ChallengeState::Pending).await?;

        let transitioned = self
            .challenges
            .update_state(challenge_id, ChallengeState::Pending, ChallengeState::Notifying)
            .await;
        self.shared_store.unlock(&lock).await?;
        let challenge = transitioned?;

        let player_notified = self.wake_up(&challenge).await;

        self.acquire_lock_or_conflict(&lock, challenge_id, ChallengeState::Notifying).await?;
        let result = async {
            let challenge = self
                .challenges
                .update_state(challenge_id, ChallengeState::Notifying, ChallengeState::WaitingResponse)
                .await?;
            let challenge = self.challenges.increment_attempt(challenge.id).await?;
            self.scheduler
                .schedule_timeout(
                    challenge_id,
                    1,
                    self.config.handshake_timeout(),
                    Arc::clone(self).run_timeout(challenge_id, 1),
                )
                .await;
            Ok::<_, HandshakeError>(challenge.state())
        }
        .await;
        self.shared_store.unlock(&lock).await?;

        Ok(InitiateResult { state: result?, player_notified })
    }

    /// Live + push delivery of a wake-up, outside the lock (spec §5's
    /// recommended release-and-reacquire shape).
    async fn wake_up(&self, challenge: &Challenge) -> bool {
        let online = self.presence.is_online(challenge.challenger_id).await.unwrap_or(false);
        if online {
            let payload = json!({
                "challengeId": challenge.id,
                "challenger": challenge.challenged_id,
                "gameType": challenge.game_type,
                "now": Utc::now(),
            });
            if let Err(e) = self.hub.emit(challenge.challenger_id, "challenge:wake-up", payload).await {
                tracing::warn!(challenge_id = %challenge.id, err = %e, "wake-up live emit failed");
            }
        }
        let push_succeeded = self
            .push
            .send(
                challenge.challenger_id,
                &PushPayload {
                    title: "Wake up!".to_owned(),
                    body: format!("Your opponent accepted your {} challenge", challenge.game_type),
                    challenge_id: Some(challenge.id),
                    event: "challenge:wake-up".to_owned(),
                },
            )
            .await;
        online || push_succeeded
    }

    /// **HandleWakeUpResponse(challengeId, userId, response)**.
    pub async fn handle_wake_up_response(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
        response: WakeUpResponse,
    ) -> Result<RespondOutcome, HandshakeError> {
        let lock = lock_key(challenge_id);
        self.acquire_lock_or_conflict(&lock, challenge_id, ChallengeState::WaitingResponse).await?;

        let result = self.handle_wake_up_response_locked(challenge_id, user_id, response).await;
        self.shared_store.unlock(&lock).await?;
        result
    }

    async fn handle_wake_up_response_locked(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
        response: WakeUpResponse,
    ) -> Result<RespondOutcome, HandshakeError> {
        let challenge = self.challenges.get(challenge_id).await?;
        if challenge.state() != ChallengeState::WaitingResponse {
            return Err(HandshakeError::Conflict(format!(
                "challenge {challenge_id} is not WAITING_RESPONSE"
            )));
        }
        if user_id != challenge.challenger_id {
            return Err(HandshakeError::Forbidden);
        }

        self.scheduler.cancel_timeout(challenge_id, challenge.attempts as u32).await;

        match response {
            WakeUpResponse::Accept => {
                let challenge = self
                    .challenges
                    .update_state(challenge_id, ChallengeState::WaitingResponse, ChallengeState::Active)
                    .await?;
                let session = self
                    .sessions
                    .create(
                        challenge_id,
                        challenge.challenger_id,
                        challenge.challenged_id,
                        json!({}),
                    )
                    .await?;

                for (user, opponent) in [
                    (challenge.challenger_id, challenge.challenged_id),
                    (challenge.challenged_id, challenge.challenger_id),
                ] {
                    let opponent_user = self.users.try_get_by_id(opponent).await?;
                    let payload = json!({
                        "sessionId": session.id,
                        "challengeId": challenge.id,
                        "opponent": opponent_user.map(|u| json!({"id": u.id, "username": u.username})),
                        "gameType": challenge.game_type,
                    });
                    if let Err(e) = self.hub.emit(user, "session:ready", payload).await {
                        tracing::warn!(session_id = %session.id, %user, err = %e, "session:ready emit failed");
                    }
                }

                Ok(RespondOutcome::SessionCreated { session_id: session.id })
            }
            WakeUpResponse::Decline => {
                let challenge = self
                    .challenges
                    .update_state(challenge_id, ChallengeState::WaitingResponse, ChallengeState::Declined)
                    .await?;
                let payload = json!({"challengeId": challenge.id});
                if let Err(e) = self.hub.emit(challenge.challenged_id, "challenge:declined", payload).await
                {
                    tracing::warn!(challenge_id = %challenge.id, err = %e, "decline emit failed");
                }
                Ok(RespondOutcome::Declined)
            }
        }
    }

    /// **HandleTimeout(challengeId, attempt)** — Scheduler handler. Runs as
    /// a tokio task body; errors are logged, never propagated, since the
    /// scheduler has no caller to report to.
    fn run_timeout(
        self: Arc<Self>,
        challenge_id: Uuid,
        attempt: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.handle_timeout(challenge_id, attempt).await {
                tracing::warn!(%challenge_id, attempt, err = %e, "timeout handler failed");
            }
        })
    }

    pub async fn handle_timeout(
        self: &Arc<Self>,
        challenge_id: Uuid,
        attempt: u32,
    ) -> Result<(), HandshakeError> {
        let lock = lock_key(challenge_id);
        if !self.acquire_lock_or_quiet(&lock, challenge_id, ChallengeState::WaitingResponse).await? {
            return Ok(());
        }
        let result = self.handle_timeout_locked(challenge_id, attempt).await;
        self.shared_store.unlock(&lock).await?;
        result
    }

    async fn handle_timeout_locked(
        self: &Arc<Self>,
        challenge_id: Uuid,
        attempt: u32,
    ) -> Result<(), HandshakeError> {
        let challenge = self.challenges.get(challenge_id).await?;
        if challenge.state() != ChallengeState::WaitingResponse {
            return Ok(());
        }

        if attempt >= self.config.max_retry_attempts {
            let challenge = self
                .challenges
                .update_state(challenge_id, ChallengeState::WaitingResponse, ChallengeState::Timeout)
                .await?;
            let payload = json!({"challengeId": challenge.id, "now": Utc::now()});
            if let Err(e) = self.hub.emit(challenge.challenged_id, "challenge:timeout", payload).await {
                tracing::warn!(%challenge_id, err = %e, "timeout emit failed");
            }
            return Ok(());
        }

        self.wake_up(&challenge).await;
        let challenge = self.challenges.increment_attempt(challenge_id).await?;
        let next_attempt = attempt + 1;
        self.scheduler
            .schedule_timeout(
                challenge_id,
                next_attempt,
                self.config.handshake_timeout(),
                Arc::clone(self).run_timeout(challenge_id, next_attempt),
            )
            .await;
        debug_assert_eq!(challenge.attempts as u32, next_attempt);
        Ok(())
    }

    /// **DeclineByChallenged(challengeId, userId)**.
    pub async fn decline_by_challenged(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), HandshakeError> {
        let lock = lock_key(challenge_id);
        self.acquire_lock_or_conflict(&lock, challenge_id, ChallengeState::Pending).await?;
        let result = self.decline_by_challenged_locked(challenge_id, user_id).await;
        self.shared_store.unlock(&lock).await?;
        result
    }

    async fn decline_by_challenged_locked(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), HandshakeError> {
        let challenge = self.challenges.get(challenge_id).await?;
        if challenge.state() != ChallengeState::Pending {
            return Err(HandshakeError::Conflict(format!("challenge {challenge_id} is not PENDING")));
        }
        if user_id != challenge.challenged_id {
            return Err(HandshakeError::Forbidden);
        }

        let challenge = self
            .challenges
            .update_state(challenge_id, ChallengeState::Pending, ChallengeState::Declined)
            .await?;
        let payload = json!({"challengeId": challenge.id, "declinedBy": user_id});
        if let Err(e) = self.hub.emit(challenge.challenger_id, "challenge:declined", payload).await {
            tracing::warn!(%challenge_id, err = %e, "decline emit failed");
        }
        Ok(())
    }

    /// **MarkExpired** — Cleanup job. Outside the per-challenge lock; the
    /// row-level `WHERE state = 'PENDING'` guard resolves races with
    /// `InitiateHandshake` (spec §4.8).
    pub async fn mark_expired(&self) -> Result<u64, HandshakeError> {
        self.challenges.mark_expired().await
    }

    pub async fn delete_terminal_older_than(&self, days: i64) -> Result<u64, HandshakeError> {
        self.challenges.delete_terminal_older_than(days).await
    }

    pub async fn end_session(
        &self,
        session_id: Uuid,
        terminal: SessionState,
        metadata: Option<serde_json::Value>,
    ) -> Result<crate::db::models::Session, HandshakeError> {
        self.sessions.end(session_id, terminal, metadata).await
    }
}

/// Total time a `HandshakeTimeoutSeconds`-spaced retry ladder can run for,
/// used by `tests/specs` to bound how long S3 needs to wait.
pub fn max_handshake_duration(config: &Config) -> Duration {
    config.handshake_timeout() * config.max_retry_attempts
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
