// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration, resolved from CLI flags or environment variables
//! (spec §6, "Configuration").

use clap::Parser;

/// Configuration for the handshake coordinator.
#[derive(Debug, Clone, Parser)]
#[command(name = "handshake-server", version, about = "Wake-up handshake coordinator")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "HANDSHAKE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "HANDSHAKE_PORT")]
    pub port: u16,

    /// API version prefix, e.g. "v1" for `/api/v1/...`.
    #[arg(long, default_value = "v1", env = "HANDSHAKE_API_VERSION")]
    pub api_version: String,

    /// Comma-separated allowed CORS origins. Empty = permissive (dev only).
    #[arg(long, env = "HANDSHAKE_ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Postgres connection string for the Durable Record Store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string for the Shared-Store Adapter.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    /// Secret used to sign bearer tokens (HS256).
    #[arg(long, env = "HANDSHAKE_TOKEN_SECRET")]
    pub token_secret: String,

    /// Bearer token lifetime in seconds.
    #[arg(long, default_value_t = 86400 * 30, env = "HANDSHAKE_TOKEN_LIFETIME_SECONDS")]
    pub token_lifetime_seconds: i64,

    /// Push vendor base URL. If unset, push delivery is disabled (degrades gracefully).
    #[arg(long, env = "HANDSHAKE_PUSH_VENDOR_URL")]
    pub push_vendor_url: Option<String>,

    /// Push vendor API credential.
    #[arg(long, env = "HANDSHAKE_PUSH_VENDOR_KEY")]
    pub push_vendor_key: Option<String>,

    /// Hard expiration window for a freshly created challenge, in seconds.
    #[arg(long, default_value_t = 3600, env = "CHALLENGE_EXPIRATION_SECONDS")]
    pub challenge_expiration_seconds: i64,

    /// Seconds to wait for the challenger's response to a single wake-up attempt.
    #[arg(long, default_value_t = 30, env = "HANDSHAKE_TIMEOUT_SECONDS")]
    pub handshake_timeout_seconds: u64,

    /// Maximum number of wake-up attempts before a challenge times out.
    #[arg(long, default_value_t = 3, env = "MAX_RETRY_ATTEMPTS")]
    pub max_retry_attempts: u32,

    /// Heartbeat interval clients are expected to honor.
    #[arg(long, default_value_t = 30, env = "HEARTBEAT_INTERVAL_SECONDS")]
    pub heartbeat_interval_seconds: u64,

    /// TTL for presence hash/set entries, refreshed by heartbeat.
    #[arg(long, default_value_t = 60, env = "PRESENCE_TTL_SECONDS")]
    pub presence_ttl_seconds: u64,

    /// TTL for the per-challenge distributed lock.
    #[arg(long, default_value_t = 10, env = "LOCK_TTL_SECONDS")]
    pub lock_ttl_seconds: u64,

    /// Retention window (days) after which terminal challenges are pruned.
    #[arg(long, default_value_t = 30, env = "HANDSHAKE_RETENTION_DAYS")]
    pub retention_days: i64,

    /// Interval between cleanup sweeps (MarkExpired + DeleteTerminalOlderThan).
    #[arg(long, default_value_t = 60, env = "HANDSHAKE_CLEANUP_INTERVAL_SECONDS")]
    pub cleanup_interval_seconds: u64,
}

impl Config {
    pub fn handshake_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.handshake_timeout_seconds)
    }

    pub fn presence_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.presence_ttl_seconds)
    }

    pub fn lock_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn challenge_expiration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.challenge_expiration_seconds)
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_lifetime_seconds)
    }

    /// Parsed allowed-origins list, empty meaning "allow any" (dev mode).
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .as_deref()
            .map(|raw| raw.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}
