// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presence Registry (spec §4.2): the cluster-wide view of which users
//! currently have at least one live connection open. Advisory only — never
//! authoritative for state-machine correctness.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HandshakeError;
use crate::shared_store::SharedStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub is_online: bool,
    pub last_seen: chrono::DateTime<Utc>,
    pub connection_count: u64,
}

#[derive(Clone)]
pub struct PresenceRegistry {
    store: SharedStore,
    ttl: Duration,
}

fn presence_key(user: Uuid) -> String {
    format!("presence:{user}")
}

fn user_conn_key(user: Uuid) -> String {
    format!("user_conn:{user}")
}

fn conn_key(conn_id: &str) -> String {
    format!("conn:{conn_id}")
}

impl PresenceRegistry {
    pub fn new(store: SharedStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn set_online(&self, user: Uuid, conn_id: &str) -> Result<(), HandshakeError> {
        self.store.set_add(&user_conn_key(user), conn_id).await?;
        self.store.key_set(&conn_key(conn_id), &user.to_string()).await?;
        self.store.key_expire(&conn_key(conn_id), self.ttl).await?;

        let count = self.store.set_count(&user_conn_key(user)).await?;
        self.write_snapshot(user, true, count).await
    }

    pub async fn set_offline(&self, user: Uuid, conn_id: &str) -> Result<(), HandshakeError> {
        self.store.set_remove(&user_conn_key(user), conn_id).await?;
        self.store.key_del(&conn_key(conn_id)).await?;

        let count = self.store.set_count(&user_conn_key(user)).await?;
        self.write_snapshot(user, count > 0, count).await
    }

    /// Refresh TTL and `lastSeen` for an existing presence record. Never
    /// creates one — a heartbeat from a user whose presence already
    /// expired must not resurrect a ghost-online state (spec §4.2).
    pub async fn heartbeat(&self, user: Uuid) -> Result<(), HandshakeError> {
        if !self.store.key_exists(&presence_key(user)).await? {
            return Ok(());
        }
        let count = self.store.set_count(&user_conn_key(user)).await?;
        self.write_snapshot(user, count > 0, count).await
    }

    pub async fn is_online(&self, user: Uuid) -> Result<bool, HandshakeError> {
        Ok(self.store.set_count(&user_conn_key(user)).await? > 0)
    }

    pub async fn connections(&self, user: Uuid) -> Result<Vec<String>, HandshakeError> {
        self.store.set_members(&user_conn_key(user)).await
    }

    pub async fn user_for_connection(&self, conn_id: &str) -> Result<Option<Uuid>, HandshakeError> {
        let raw = self.store.key_get(&conn_key(conn_id)).await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    pub async fn snapshot(&self, user: Uuid) -> Result<PresenceSnapshot, HandshakeError> {
        let fields = self.store.hash_get_all(&presence_key(user)).await?;
        let is_online = fields.get("isOnline").map(String::as_str) == Some("true");
        let last_seen = fields
            .get("lastSeen")
            .and_then(|s| s.parse::<chrono::DateTime<Utc>>().ok())
            .unwrap_or_else(Utc::now);
        let connection_count = fields.get("count").and_then(|s| s.parse().ok()).unwrap_or(0);
        Ok(PresenceSnapshot { is_online, last_seen, connection_count })
    }

    async fn write_snapshot(
        &self,
        user: Uuid,
        is_online: bool,
        count: u64,
    ) -> Result<(), HandshakeError> {
        let mut fields = HashMap::new();
        fields.insert("isOnline".to_owned(), is_online.to_string());
        fields.insert("lastSeen".to_owned(), Utc::now().to_rfc3339());
        fields.insert("count".to_owned(), count.to_string());
        self.store.hash_put(&presence_key(user), &fields, Some(self.ttl)).await
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
