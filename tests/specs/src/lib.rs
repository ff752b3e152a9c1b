// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary tests (spec §8's S1–S7 scenarios).
//!
//! Spawns the real `handshake-server` binary as a subprocess against a
//! live Postgres and Redis, reachable via `DATABASE_URL`/`REDIS_URL`, and
//! exercises it over HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `handshake-server` binary.
pub fn server_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("handshake-server")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Skip the calling test (with a message) if the given env var isn't set.
/// Returns the value when present.
pub fn require_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("{name} not set — skipping test");
            None
        }
    }
}

/// Tunable timing knobs, so S3 (timeout exhaustion) doesn't need 90s of
/// real wall-clock time.
pub struct ServerOpts {
    pub handshake_timeout_seconds: u64,
    pub max_retry_attempts: u32,
}

impl Default for ServerOpts {
    fn default() -> Self {
        Self { handshake_timeout_seconds: 30, max_retry_attempts: 3 }
    }
}

/// A running `handshake-server` process, killed on drop.
pub struct Server {
    child: Child,
    port: u16,
    pub token_secret: String,
}

impl Server {
    /// Spawn the server against `database_url`/`redis_url`, binding an
    /// ephemeral port.
    pub fn start(database_url: &str, redis_url: &str, opts: ServerOpts) -> anyhow::Result<Self> {
        ensure_crypto();
        let binary = server_binary();
        anyhow::ensure!(binary.exists(), "handshake-server binary not found at {}", binary.display());

        let port = free_port()?;
        let token_secret = format!("spec-secret-{}", uuid::Uuid::new_v4());

        let child = Command::new(&binary)
            .args([
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "--database-url",
                database_url,
                "--redis-url",
                redis_url,
                "--token-secret",
                &token_secret,
                "--handshake-timeout-seconds",
                &opts.handshake_timeout_seconds.to_string(),
                "--max-retry-attempts",
                &opts.max_retry_attempts.to_string(),
            ])
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port, token_secret })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://127.0.0.1:{}/ws?token={token}", self.port)
    }

    /// Poll `/health` until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("handshake-server did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A registered test user: id + bearer token, ready to use as `Authorization`.
pub struct TestUser {
    pub id: uuid::Uuid,
    pub token: String,
}

/// Register a fresh, uniquely-named user against a running server.
pub async fn register_user(client: &reqwest::Client, base_url: &str, name: &str) -> anyhow::Result<TestUser> {
    let body = serde_json::json!({
        "username": name,
        "email": format!("{name}@example.com"),
        "password": "password123",
    });
    let resp = client.post(format!("{base_url}/auth/register")).json(&body).send().await?;
    anyhow::ensure!(resp.status().is_success(), "register failed: {}", resp.status());
    let parsed: serde_json::Value = resp.json().await?;
    let data = &parsed["data"];
    let id = uuid::Uuid::parse_str(data["user"]["id"].as_str().unwrap())?;
    let token = data["token"].as_str().unwrap().to_owned();
    Ok(TestUser { id, token })
}
