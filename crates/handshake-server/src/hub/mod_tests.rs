use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use super::ConnectionHub;
use crate::shared_store::SharedStore;

macro_rules! require_redis {
    () => {
        match std::env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("REDIS_URL not set — skipping test");
                return;
            }
        }
    };
}

#[tokio::test]
async fn emit_reaches_a_locally_joined_group() {
    let url = require_redis!();
    let store = SharedStore::connect(&url).await.expect("connect");
    let hub = ConnectionHub::start(store);

    let user = Uuid::new_v4();
    let mut rx = hub.join_user(user).await;

    // Give the fan-out listener a moment to establish its subscription.
    tokio::time::sleep(Duration::from_millis(200)).await;

    hub.emit(user, "challenge:received", json!({"challengeId": "c1"})).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.event, "challenge:received");
}

#[tokio::test]
async fn emit_session_reaches_a_locally_joined_session_group() {
    let url = require_redis!();
    let store = SharedStore::connect(&url).await.expect("connect");
    let hub = ConnectionHub::start(store);

    let session = Uuid::new_v4();
    let mut rx = hub.join_session(session).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    hub.emit_session(session, "session:ready", json!({})).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.event, "session:ready");
}
