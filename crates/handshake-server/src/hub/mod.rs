// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection Hub (spec §4.5): per-user and per-session delivery groups,
//! fanned out across the whole cluster via the Shared-Store Adapter's
//! pub/sub (Design Note "Emit-and-forget across a cluster"). Each worker
//! delivers locally only to its own connections; a single background task
//! per process re-publishes inbound cross-process events onto local
//! `tokio::sync::broadcast` channels.

pub mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::HandshakeError;
use crate::shared_store::SharedStore;

const GROUP_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

fn user_channel(user: Uuid) -> String {
    format!("hub:{user}")
}

fn session_channel(session: Uuid) -> String {
    format!("hub:session:{session}")
}

pub struct ConnectionHub {
    store: SharedStore,
    user_groups: RwLock<HashMap<Uuid, broadcast::Sender<HubEvent>>>,
    session_groups: RwLock<HashMap<Uuid, broadcast::Sender<HubEvent>>>,
}

impl ConnectionHub {
    /// Construct the hub and spawn its cross-process fan-out listener.
    pub fn start(store: SharedStore) -> Arc<Self> {
        let hub = Arc::new(Self {
            store,
            user_groups: RwLock::new(HashMap::new()),
            session_groups: RwLock::new(HashMap::new()),
        });
        tokio::spawn(Arc::clone(&hub).run_fanout_listener());
        hub
    }

    async fn run_fanout_listener(self: Arc<Self>) {
        let mut pubsub = match self.store.psubscribe("hub:*").await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(err = %e, "hub fan-out listener failed to subscribe");
                return;
            }
        };
        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let channel: String = msg.get_channel_name().to_owned();
            let Ok(payload) = msg.get_payload::<String>() else { continue };
            let Ok(event) = serde_json::from_str::<HubEvent>(&payload) else { continue };

            if let Some(rest) = channel.strip_prefix("hub:session:") {
                if let Ok(session) = rest.parse::<Uuid>() {
                    self.deliver_local_session(session, event).await;
                }
            } else if let Some(rest) = channel.strip_prefix("hub:") {
                if let Ok(user) = rest.parse::<Uuid>() {
                    self.deliver_local_user(user, event).await;
                }
            }
        }
    }

    async fn deliver_local_user(&self, user: Uuid, event: HubEvent) {
        if let Some(tx) = self.user_groups.read().await.get(&user) {
            let _ = tx.send(event);
        }
    }

    async fn deliver_local_session(&self, session: Uuid, event: HubEvent) {
        if let Some(tx) = self.session_groups.read().await.get(&session) {
            let _ = tx.send(event);
        }
    }

    /// Join (or create) a user's per-process delivery group.
    pub async fn join_user(&self, user: Uuid) -> broadcast::Receiver<HubEvent> {
        let mut groups = self.user_groups.write().await;
        groups
            .entry(user)
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    pub async fn join_session(&self, session: Uuid) -> broadcast::Receiver<HubEvent> {
        let mut groups = self.session_groups.write().await;
        groups
            .entry(session)
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// `Emit(userId, event, payload)`: best-effort, at-most-once per
    /// connection, delivered cluster-wide via pub/sub.
    pub async fn emit(
        &self,
        user: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), HandshakeError> {
        let body = HubEvent { event: event.to_owned(), payload };
        let json = serde_json::to_string(&body)
            .map_err(|e| HandshakeError::Internal(format!("event serialize failed: {e}")))?;
        self.store.publish(&user_channel(user), &json).await
    }

    pub async fn emit_session(
        &self,
        session: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), HandshakeError> {
        let body = HubEvent { event: event.to_owned(), payload };
        let json = serde_json::to_string(&body)
            .map_err(|e| HandshakeError::Internal(format!("event serialize failed: {e}")))?;
        self.store.publish(&session_channel(session), &json).await
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
