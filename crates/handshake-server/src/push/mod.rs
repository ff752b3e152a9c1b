// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push Channel (spec §4.4): multi-device fan-out to the out-of-band push
//! vendor, with dead-token pruning. Degrades gracefully when unconfigured
//! (grounded on `UpstreamClient` in the teacher, generalized to a vendor
//! that may simply not exist).

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::PushToken;
use crate::db::users::UserRepo;
use crate::error::HandshakeError;

/// The fixed wake-up payload shape (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<Uuid>,
    pub event: String,
}

#[derive(Debug, Serialize)]
struct VendorRequest<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<&'a str>,
    payload: &'a PushPayload,
}

#[derive(Debug, serde::Deserialize)]
struct VendorResult {
    token: String,
    status: VendorStatus,
}

#[derive(Debug, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum VendorStatus {
    Delivered,
    Invalid,
    Unregistered,
    Failed,
}

pub struct PushChannel {
    users: UserRepo,
    vendor: Option<VendorConfig>,
    client: Client,
    /// Serializes every read-modify-write of a user's push-token list
    /// through this single component (spec §3: "a User's push-token list
    /// is shared and mutated by the Push Channel only; mutations must
    /// tolerate concurrent readers"). Guards registration, unregistration,
    /// and the dead-token sweep in `send` against each other within one
    /// process; it does not make the mutation atomic across processes —
    /// that would need a compare-and-set on the `users` row, which the
    /// spec does not require.
    tokens_lock: tokio::sync::Mutex<()>,
}

struct VendorConfig {
    base_url: String,
    key: String,
}

impl PushChannel {
    pub fn new(users: UserRepo, base_url: Option<String>, key: Option<String>) -> Self {
        let vendor = match (base_url, key) {
            (Some(base_url), Some(key)) => Some(VendorConfig { base_url, key }),
            _ => None,
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { users, vendor, client, tokens_lock: tokio::sync::Mutex::new(()) }
    }

    /// Register a device's push token. Idempotent per spec §8: registering
    /// the same token twice leaves the list unchanged after the second
    /// call.
    pub async fn register(
        &self,
        user: Uuid,
        token: &str,
        platform: Option<&str>,
    ) -> Result<(), HandshakeError> {
        let _guard = self.tokens_lock.lock().await;
        self.users.add_push_token(user, token, platform).await
    }

    pub async fn unregister(&self, user: Uuid, token: &str) -> Result<(), HandshakeError> {
        let _guard = self.tokens_lock.lock().await;
        self.users.remove_push_token(user, token).await
    }

    /// `Send(user, payload) -> bool`. Never fails the caller: an
    /// unconfigured vendor, or a wholly-failed delivery, both log and
    /// return `false`.
    pub async fn send(&self, user: Uuid, payload: &PushPayload) -> bool {
        let Some(vendor) = &self.vendor else {
            tracing::info!(%user, "push vendor unconfigured, skipping delivery");
            return false;
        };

        let tokens = match self.users.get_by_id(user).await {
            Ok(u) => u.push_tokens.0,
            Err(e) => {
                tracing::warn!(%user, err = %e, "failed to load push tokens");
                return false;
            }
        };
        if tokens.is_empty() {
            return false;
        }

        let mut any_succeeded = false;
        let mut dead = Vec::new();

        for token in &tokens {
            match self.deliver_one(vendor, token, payload).await {
                Ok(VendorStatus::Delivered) => any_succeeded = true,
                Ok(VendorStatus::Invalid) | Ok(VendorStatus::Unregistered) => {
                    dead.push(token.token.clone());
                }
                Ok(VendorStatus::Failed) => {}
                Err(e) => tracing::warn!(%user, token = %token.token, err = %e, "push delivery failed"),
            }
        }

        if !dead.is_empty() {
            // Re-read under the lock rather than filtering the `tokens` this
            // delivery pass started from, so a concurrent `register` landing
            // mid-delivery isn't clobbered by writing back a stale list.
            let _guard = self.tokens_lock.lock().await;
            match self.users.get_by_id(user).await {
                Ok(current) => {
                    let remaining: Vec<PushToken> =
                        current.push_tokens.0.into_iter().filter(|t| !dead.contains(&t.token)).collect();
                    if let Err(e) = self.users.set_push_tokens(user, &remaining).await {
                        tracing::warn!(%user, err = %e, "failed to prune dead push tokens");
                    }
                }
                Err(e) => tracing::warn!(%user, err = %e, "failed to reload push tokens before prune"),
            }
        }

        any_succeeded
    }

    async fn deliver_one(
        &self,
        vendor: &VendorConfig,
        token: &PushToken,
        payload: &PushPayload,
    ) -> Result<VendorStatus, HandshakeError> {
        let req = VendorRequest { token: &token.token, platform: token.platform.as_deref(), payload };
        let resp = self
            .client
            .post(format!("{}/send", vendor.base_url))
            .bearer_auth(&vendor.key)
            .json(&req)
            .send()
            .await?;
        let result: VendorResult = resp.error_for_status()?.json().await?;
        debug_assert_eq!(result.token, token.token);
        Ok(result.status)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
