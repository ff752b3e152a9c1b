// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The live channel (spec §4.5, §6): one axum WebSocket handler per
//! connection.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::verify_token;
use crate::hub::HubEvent;
use crate::statemachine::WakeUpResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws` — live-channel upgrade. Auth token supplied at handshake via
/// `?token=`.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(token) = query.token else {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    };
    let user_id = match verify_token(&token, &state.config.token_secret) {
        Ok(id) => id,
        Err(_) => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(state, user_id, socket)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum InboundMessage {
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "challenge:respond")]
    ChallengeRespond {
        #[serde(rename = "challengeId")]
        challenge_id: Uuid,
        response: String,
    },
    #[serde(rename = "session:join")]
    SessionJoin {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    #[serde(rename = "session:leave")]
    SessionLeave {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
}

async fn handle_connection(state: Arc<AppState>, user_id: Uuid, socket: WebSocket) {
    let username = match state.users.try_get_by_id(user_id).await {
        Ok(Some(u)) => u.username,
        _ => return,
    };

    let conn_id = Uuid::new_v4().to_string();
    if let Err(e) = state.presence.set_online(user_id, &conn_id).await {
        tracing::warn!(%user_id, err = %e, "presence set_online failed");
        return;
    }

    let (tx, mut outbound) = mpsc::unbounded_channel::<HubEvent>();
    let user_forward = spawn_forward(state.hub.join_user(user_id).await, tx.clone());
    let mut session_forwards: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    let (mut ws_tx, mut ws_rx) = socket.split();
    let connected = HubEvent {
        event: "connected".to_owned(),
        payload: json!({"userId": user_id, "username": username, "now": Utc::now()}),
    };
    if send_event(&mut ws_tx, &connected).await.is_err() {
        cleanup(&state, user_id, &conn_id, user_forward, session_forwards).await;
        return;
    }

    loop {
        tokio::select! {
            event = outbound.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(
                            &state,
                            user_id,
                            &text,
                            &mut ws_tx,
                            &tx,
                            &mut session_forwards,
                        )
                        .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    cleanup(&state, user_id, &conn_id, user_forward, session_forwards).await;
}

fn spawn_forward(
    mut rx: tokio::sync::broadcast::Receiver<HubEvent>,
    tx: mpsc::UnboundedSender<HubEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_event(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &HubEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_owned());
    ws_tx.send(Message::Text(json.into())).await
}

async fn handle_inbound(
    state: &Arc<AppState>,
    user_id: Uuid,
    text: &str,
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    tx: &mpsc::UnboundedSender<HubEvent>,
    session_forwards: &mut HashMap<Uuid, JoinHandle<()>>,
) {
    let Ok(msg) = serde_json::from_str::<InboundMessage>(text) else {
        let _ = send_event(
            ws_tx,
            &HubEvent { event: "error".to_owned(), payload: json!({"message": "unrecognized message"}) },
        )
        .await;
        return;
    };

    match msg {
        InboundMessage::Heartbeat => {
            if let Err(e) = state.presence.heartbeat(user_id).await {
                tracing::warn!(%user_id, err = %e, "heartbeat failed");
            }
            let _ = send_event(
                ws_tx,
                &HubEvent { event: "heartbeat-ack".to_owned(), payload: json!({"now": Utc::now()}) },
            )
            .await;
        }
        InboundMessage::ChallengeRespond { challenge_id, response } => {
            let result = match response.parse::<WakeUpResponse>() {
                Ok(response) => state
                    .orchestrator
                    .handle_wake_up_response(challenge_id, user_id, response)
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            let event = match result {
                Ok(()) => {
                    HubEvent { event: "challenge:respond-ack".to_owned(), payload: json!({"result": "ok"}) }
                }
                Err(e) => HubEvent { event: "error".to_owned(), payload: json!({"message": e.to_string()}) },
            };
            let _ = send_event(ws_tx, &event).await;
        }
        InboundMessage::SessionJoin { session_id } => {
            if !session_forwards.contains_key(&session_id) {
                let rx = state.hub.join_session(session_id).await;
                session_forwards.insert(session_id, spawn_forward(rx, tx.clone()));
            }
            let _ = send_event(
                ws_tx,
                &HubEvent { event: "session:join-ack".to_owned(), payload: json!({"sessionId": session_id}) },
            )
            .await;
        }
        InboundMessage::SessionLeave { session_id } => {
            if let Some(handle) = session_forwards.remove(&session_id) {
                handle.abort();
            }
            let _ = send_event(
                ws_tx,
                &HubEvent { event: "session:leave-ack".to_owned(), payload: json!({"sessionId": session_id}) },
            )
            .await;
        }
    }
}

async fn cleanup(
    state: &Arc<AppState>,
    user_id: Uuid,
    conn_id: &str,
    user_forward: JoinHandle<()>,
    session_forwards: HashMap<Uuid, JoinHandle<()>>,
) {
    user_forward.abort();
    for (_, handle) in session_forwards {
        handle.abort();
    }
    if let Err(e) = state.presence.set_offline(user_id, conn_id).await {
        tracing::warn!(%user_id, err = %e, "presence set_offline failed");
    }
}
