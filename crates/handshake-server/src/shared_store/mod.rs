// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-Store Adapter (spec §4.1): the sole place that speaks to Redis.
//! Everything above this module — Presence, the per-challenge lock, the
//! Connection Hub's cross-process fan-out — goes through here.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::HandshakeError;

#[derive(Clone)]
pub struct SharedStore {
    conn: ConnectionManager,
    redis_url: String,
}

impl SharedStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, redis_url: redis_url.to_owned() })
    }

    /// `SET key value NX PX ttl_ms`. Release is a bare delete (spec §4.1 —
    /// token-scoped release is recommended, not mandated; this
    /// implementation takes the simpler bare-delete default).
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> Result<bool, HandshakeError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1_u8)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    pub async fn unlock(&self, key: &str) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// Acquire `key`, run `f`, release unconditionally. Fails with
    /// `Transient` if the lock is already held.
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        ttl: Duration,
        f: F,
    ) -> Result<T, HandshakeError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, HandshakeError>>,
    {
        if !self.try_lock(key, ttl).await? {
            return Err(HandshakeError::Transient(format!("lock unavailable: {key}")));
        }
        let result = f().await;
        self.unlock(key).await?;
        result
    }

    pub async fn hash_put(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        if !fields.is_empty() {
            let pairs: Vec<(&String, &String)> = fields.iter().collect();
            let _: () = conn.hset_multiple(key, &pairs).await?;
        }
        if let Some(ttl) = ttl {
            let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        }
        Ok(())
    }

    pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, HandshakeError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map)
    }

    pub async fn set_add(&self, key: &str, member: &str) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, HandshakeError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    pub async fn set_count(&self, key: &str) -> Result<u64, HandshakeError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }

    pub async fn key_exists(&self, key: &str) -> Result<bool, HandshakeError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    pub async fn key_expire(&self, key: &str, ttl: Duration) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        Ok(())
    }

    pub async fn key_get(&self, key: &str) -> Result<Option<String>, HandshakeError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    pub async fn key_set(&self, key: &str, value: &str) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    pub async fn key_del(&self, key: &str) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), HandshakeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Open a dedicated pub/sub connection subscribed to `channel`. Callers
    /// read from the returned stream for the lifetime of the subscription;
    /// this is separate from the shared multiplexed `conn` because Redis
    /// pub/sub occupies the connection exclusively.
    pub async fn subscribe(&self, channel: &str) -> Result<redis::aio::PubSub, HandshakeError> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| HandshakeError::Internal(format!("invalid redis url: {e}")))?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(pubsub)
    }

    /// As [`Self::subscribe`] but via `PSUBSCRIBE`, for the Connection
    /// Hub's single cross-cluster fan-out listener.
    pub async fn psubscribe(&self, pattern: &str) -> Result<redis::aio::PubSub, HandshakeError> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| HandshakeError::Internal(format!("invalid redis url: {e}")))?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        Ok(pubsub)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
