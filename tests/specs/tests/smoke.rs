// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against a real `handshake-server` binary, covering the
//! testable-property scenarios (S1-S7).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use handshake_specs::{register_user, require_env, Server, ServerOpts};

const TIMEOUT: Duration = Duration::from_secs(10);

macro_rules! require_stack {
    () => {{
        let Some(db) = require_env("DATABASE_URL") else { return Ok(()) };
        let Some(redis) = require_env("REDIS_URL") else { return Ok(()) };
        (db, redis)
    }};
}

async fn create_challenge(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    challenged_id: uuid::Uuid,
) -> anyhow::Result<serde_json::Value> {
    let resp = client
        .post(format!("{base_url}/challenges"))
        .bearer_auth(token)
        .json(&serde_json::json!({"challengedId": challenged_id, "gameType": "Chess"}))
        .send()
        .await?;
    anyhow::ensure!(resp.status() == 201, "create_challenge: {}", resp.status());
    Ok(resp.json().await?)
}

// S1. Happy path.
#[tokio::test]
async fn happy_path_accept_respond_creates_session() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server = Server::start(&db, &redis, ServerOpts::default())?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let suffix = uuid::Uuid::new_v4();
    let a = register_user(&client, &base, &format!("a-{suffix}")).await?;
    let b = register_user(&client, &base, &format!("b-{suffix}")).await?;

    let created = create_challenge(&client, &base, &a.token, b.id).await?;
    let challenge_id = created["data"]["challenge"]["id"].as_str().unwrap().to_owned();

    let accepted: serde_json::Value = client
        .post(format!("{base}/challenges/{challenge_id}/accept"))
        .bearer_auth(&b.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(accepted["data"]["state"], "WAITING_RESPONSE");

    let responded: serde_json::Value = client
        .post(format!("{base}/challenges/{challenge_id}/respond"))
        .bearer_auth(&a.token)
        .json(&serde_json::json!({"response": "ACCEPT"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(responded["data"]["action"], "SESSION_CREATED");
    let session_id = responded["data"]["sessionId"].as_str().unwrap().to_owned();

    let session: serde_json::Value = client
        .get(format!("{base}/sessions/{session_id}"))
        .bearer_auth(&a.token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(session["data"]["session"]["state"], "ACTIVE");

    let challenge: serde_json::Value =
        client.get(format!("{base}/challenges/{challenge_id}")).bearer_auth(&a.token).send().await?.json().await?;
    assert_eq!(challenge["data"]["challenge"]["state"], "ACTIVE");

    Ok(())
}

// S2. Decline by responder.
#[tokio::test]
async fn decline_by_responder_leaves_no_session() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server = Server::start(&db, &redis, ServerOpts::default())?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let suffix = uuid::Uuid::new_v4();
    let a = register_user(&client, &base, &format!("a-{suffix}")).await?;
    let b = register_user(&client, &base, &format!("b-{suffix}")).await?;

    let created = create_challenge(&client, &base, &a.token, b.id).await?;
    let challenge_id = created["data"]["challenge"]["id"].as_str().unwrap().to_owned();

    client.post(format!("{base}/challenges/{challenge_id}/accept")).bearer_auth(&b.token).send().await?;

    let responded: serde_json::Value = client
        .post(format!("{base}/challenges/{challenge_id}/respond"))
        .bearer_auth(&a.token)
        .json(&serde_json::json!({"response": "DECLINE"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(responded["data"]["action"], "DECLINED");

    let challenge: serde_json::Value =
        client.get(format!("{base}/challenges/{challenge_id}")).bearer_auth(&a.token).send().await?.json().await?;
    assert_eq!(challenge["data"]["challenge"]["state"], "DECLINED");

    Ok(())
}

// S3. Timeout exhaustion (sped up via --handshake-timeout-seconds).
#[tokio::test]
async fn unanswered_wake_up_eventually_times_out() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server =
        Server::start(&db, &redis, ServerOpts { handshake_timeout_seconds: 1, max_retry_attempts: 2 })?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let suffix = uuid::Uuid::new_v4();
    let a = register_user(&client, &base, &format!("a-{suffix}")).await?;
    let b = register_user(&client, &base, &format!("b-{suffix}")).await?;

    let created = create_challenge(&client, &base, &a.token, b.id).await?;
    let challenge_id = created["data"]["challenge"]["id"].as_str().unwrap().to_owned();

    client.post(format!("{base}/challenges/{challenge_id}/accept")).bearer_auth(&b.token).send().await?;

    // Never respond as `a`; the scheduler should exhaust both attempts and
    // transition the challenge to TIMEOUT.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
    loop {
        let challenge: serde_json::Value = client
            .get(format!("{base}/challenges/{challenge_id}"))
            .bearer_auth(&a.token)
            .send()
            .await?
            .json()
            .await?;
        if challenge["data"]["challenge"]["state"] == "TIMEOUT" {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("challenge never reached TIMEOUT: {challenge:?}");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Ok(())
}

// S4. Self-challenge rejection.
#[tokio::test]
async fn self_challenge_is_rejected_as_unprocessable() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server = Server::start(&db, &redis, ServerOpts::default())?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let a = register_user(&client, &base, &format!("a-{}", uuid::Uuid::new_v4())).await?;

    let resp = client
        .post(format!("{base}/challenges"))
        .bearer_auth(&a.token)
        .json(&serde_json::json!({"challengedId": a.id, "gameType": "Chess"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 422);

    Ok(())
}

// S5. Wrong-state accept (challenger tries to accept their own challenge).
#[tokio::test]
async fn accept_by_the_challenger_is_forbidden() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server = Server::start(&db, &redis, ServerOpts::default())?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let suffix = uuid::Uuid::new_v4();
    let a = register_user(&client, &base, &format!("a-{suffix}")).await?;
    let b = register_user(&client, &base, &format!("b-{suffix}")).await?;

    let created = create_challenge(&client, &base, &a.token, b.id).await?;
    let challenge_id = created["data"]["challenge"]["id"].as_str().unwrap().to_owned();

    let resp =
        client.post(format!("{base}/challenges/{challenge_id}/accept")).bearer_auth(&a.token).send().await?;
    assert_eq!(resp.status().as_u16(), 403);

    Ok(())
}

// S6. Concurrent double-accept: exactly one of two simultaneous accepts wins.
#[tokio::test]
async fn concurrent_accepts_produce_exactly_one_winner() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server = Server::start(&db, &redis, ServerOpts::default())?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let suffix = uuid::Uuid::new_v4();
    let a = register_user(&client, &base, &format!("a-{suffix}")).await?;
    let b = register_user(&client, &base, &format!("b-{suffix}")).await?;

    let created = create_challenge(&client, &base, &a.token, b.id).await?;
    let challenge_id = created["data"]["challenge"]["id"].as_str().unwrap().to_owned();

    let accept = |token: String| {
        let client = client.clone();
        let base = base.clone();
        let challenge_id = challenge_id.clone();
        async move {
            client.post(format!("{base}/challenges/{challenge_id}/accept")).bearer_auth(&token).send().await
        }
    };

    let (r1, r2) = tokio::join!(accept(b.token.clone()), accept(b.token.clone()));
    let statuses = [r1?.status().as_u16(), r2?.status().as_u16()];
    assert_eq!(statuses.iter().filter(|&&s| s == 200).count(), 1, "exactly one accept should win: {statuses:?}");
    assert_eq!(statuses.iter().filter(|&&s| s == 409).count(), 1, "the loser should see a conflict: {statuses:?}");

    let challenge: serde_json::Value =
        client.get(format!("{base}/challenges/{challenge_id}")).bearer_auth(&a.token).send().await?.json().await?;
    assert_eq!(challenge["data"]["challenge"]["state"], "WAITING_RESPONSE");
    assert_eq!(challenge["data"]["challenge"]["attempts"], 1);

    Ok(())
}

// S7. Presence multi-device.
#[tokio::test]
async fn presence_reflects_multiple_live_connections() -> anyhow::Result<()> {
    let (db, redis) = require_stack!();
    let server = Server::start(&db, &redis, ServerOpts::default())?;
    server.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let base = server.base_url();
    let a = register_user(&client, &base, &format!("a-{}", uuid::Uuid::new_v4())).await?;

    let (mut ws1, _) = tokio_tungstenite::connect_async(server.ws_url(&a.token)).await?;
    let _ = tokio::time::timeout(TIMEOUT, ws1.next()).await?; // `connected` envelope
    let (mut ws2, _) = tokio_tungstenite::connect_async(server.ws_url(&a.token)).await?;
    let _ = tokio::time::timeout(TIMEOUT, ws2.next()).await?;

    tokio::time::sleep(Duration::from_millis(150)).await;
    let presence: serde_json::Value =
        client.get(format!("{base}/presence/{}", a.id)).bearer_auth(&a.token).send().await?.json().await?;
    assert_eq!(presence["data"]["presence"]["isOnline"], true);
    assert_eq!(presence["data"]["presence"]["connectionCount"], 2);

    ws1.send(Message::Close(None)).await?;
    ws1.close(None).await.ok();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let presence: serde_json::Value =
        client.get(format!("{base}/presence/{}", a.id)).bearer_auth(&a.token).send().await?.json().await?;
    assert_eq!(presence["data"]["presence"]["isOnline"], true);
    assert_eq!(presence["data"]["presence"]["connectionCount"], 1);

    ws2.send(Message::Close(None)).await?;
    ws2.close(None).await.ok();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let presence: serde_json::Value =
        client.get(format!("{base}/presence/{}", a.id)).bearer_auth(&a.token).send().await?.json().await?;
    assert_eq!(presence["data"]["presence"]["isOnline"], false);

    Ok(())
}
