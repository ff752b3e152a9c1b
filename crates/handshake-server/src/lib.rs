// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handshake coordinator: the wake-up handshake between two players
//! (spec §1). Composes the Shared-Store Adapter, Durable Record Store,
//! Presence Registry, Push Channel, Connection Hub, and Scheduler behind a
//! single Handshake Orchestrator, fronted by an HTTP + WebSocket surface.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod hub;
pub mod orchestrator;
pub mod presence;
pub mod push;
pub mod scheduler;
pub mod shared_store;
pub mod statemachine;

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::challenges::ChallengeRepo;
use crate::db::sessions::SessionRepo;
use crate::db::users::UserRepo;
use crate::hub::ConnectionHub;
use crate::orchestrator::Orchestrator;
use crate::presence::PresenceRegistry;
use crate::push::PushChannel;
use crate::scheduler::Scheduler;
use crate::shared_store::SharedStore;

/// Process-wide services aggregate, held behind a single `Arc` and passed
/// to every axum handler via `State` (Design Note: "construct one instance
/// per process at startup").
pub struct AppState {
    pub config: Config,
    pub users: UserRepo,
    pub challenges: ChallengeRepo,
    pub sessions: SessionRepo,
    pub presence: PresenceRegistry,
    pub hub: Arc<ConnectionHub>,
    pub push: Arc<PushChannel>,
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: Instant,
}

/// Run the handshake coordinator until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let pool = db::connect(&config.database_url).await?;
    let shared_store = SharedStore::connect(&config.redis_url).await?;

    let users = UserRepo::new(pool.clone());
    let challenges = ChallengeRepo::new(pool.clone());
    let sessions = SessionRepo::new(pool.clone());
    let presence = PresenceRegistry::new(shared_store.clone(), config.presence_ttl());
    let hub = ConnectionHub::start(shared_store.clone());
    let push = Arc::new(PushChannel::new(
        users.clone(),
        config.push_vendor_url.clone(),
        config.push_vendor_key.clone(),
    ));
    let scheduler = Scheduler::new(shutdown.clone());

    let orchestrator = Arc::new(Orchestrator {
        users: users.clone(),
        challenges: challenges.clone(),
        sessions: sessions.clone(),
        shared_store,
        presence: presence.clone(),
        hub: Arc::clone(&hub),
        push: Arc::clone(&push),
        scheduler,
        config: config.clone(),
    });

    cleanup::spawn_cleanup_sweeper(Arc::clone(&orchestrator), config.cleanup_interval(), config.retention_days)
        .await;

    let state = Arc::new(AppState {
        config,
        users,
        challenges,
        sessions,
        presence,
        hub,
        push,
        orchestrator: Arc::clone(&orchestrator),
        started_at: Instant::now(),
    });

    // Signal handler: first SIGTERM/SIGINT starts graceful shutdown, a
    // second forces exit.
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    tracing::info!("received SIGTERM");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    tracing::info!("received SIGINT");
                }
            }
            sd.cancel();

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    tracing::info!("received SIGTERM again, forcing exit");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    tracing::info!("received SIGINT again, forcing exit");
                }
            }
            std::process::exit(130);
        });
    }

    tracing::info!("handshake-server listening on {addr}");
    let router = http::build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    orchestrator.scheduler.shutdown().await;

    Ok(())
}
