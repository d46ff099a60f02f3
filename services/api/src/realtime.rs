//! WebSocket endpoint bridging clients to the room hub

use std::{borrow::Cow, collections::HashSet, sync::Arc};

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use futures::{SinkExt, StreamExt};
use marketplace::{
    permissions::Actor,
    realtime::{ClientMessage, Dispatch, RoomEvent, RoomHub},
};
use serde::Deserialize;
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, mpsc},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware::resolve_actor,
    state::AppState,
};

/// Frames queued for one socket before forwarders wait on the writer
const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the query
/// string wins over the bearer header
fn resolve_token(
    query: WsQuery,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Option<String> {
    query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer.map(|TypedHeader(Authorization(b))| b.token().to_string()))
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let token = resolve_token(query, bearer).ok_or_else(ApiError::unauthorized)?;
    let actor = resolve_actor(&state, &token).await?;

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, actor)))
}

async fn handle_socket(socket: WebSocket, hub: RoomHub, actor: Actor) {
    info!(user_id = %actor.id, "Realtime client connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let user_id = actor.id;
    let mut reader = tokio::spawn(async move {
        let mut joined = HashSet::new();
        let mut forwarders = JoinSet::new();

        while let Some(Ok(message)) = stream.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let Some((message, frame)) = ClientMessage::parse(&text) else {
                continue;
            };

            match hub.dispatch(user_id, &message, frame).await {
                Dispatch::Joined { room, receiver } => {
                    if joined.insert(room.clone()) {
                        debug!(user_id = %user_id, room = %room, "Joined room");
                        forwarders.spawn(forward(room, receiver, tx.clone()));
                    }
                }
                Dispatch::Relayed(members) => {
                    debug!(user_id = %user_id, room = %message.room(), members, "Relayed frame");
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    info!(user_id = %actor.id, "Realtime client disconnected");
}

/// Pump one room's events into the socket until it closes or lags
async fn forward(
    room: String,
    mut receiver: broadcast::Receiver<Arc<RoomEvent>>,
    tx: mpsc::Sender<Message>,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let text = match serde_json::to_string(&event.frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(room = %room, error = %e, "Unserializable frame");
                        continue;
                    }
                };
                if tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(room = %room, skipped, "Realtime client lagged, disconnecting");
                let _ = tx
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AGAIN,
                        reason: Cow::from("lagged"),
                    })))
                    .await;
                break;
            }
            Err(RecvError::Closed) => break,
        }
    }
}
