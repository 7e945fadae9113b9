//! WebSocket upgrade into an ingress session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{future, Sink, SinkExt, StreamExt};
use parley_realtime::{Admission, Frame, Hub, Outbox};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Path(user_id): Path<String>,
    Query(query): Query<WebSocketQuery>,
) -> GatewayResult<Response> {
    if user_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("missing user id".to_string()));
    }
    if state.hub.is_shutting_down() {
        return Err(GatewayError::ServiceUnavailable);
    }

    let admission = admit(&state.hub, &user_id, query.token.as_deref()).await?;
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user_id, admission)))
}

/// Decide how the session proves its identity. A token on the upgrade request
/// is checked here so a bad one never gets a socket.
async fn admit(hub: &Hub, user_id: &str, token: Option<&str>) -> GatewayResult<Admission> {
    if !hub.requires_authentication() {
        return Ok(Admission::Authenticated);
    }

    let Some(token) = token.filter(|token| !token.is_empty()) else {
        return Ok(Admission::Handshake);
    };

    let principal = hub.verify(token).await.map_err(|error| {
        warn!(%user_id, %error, "rejected websocket upgrade");
        GatewayError::from(error)
    })?;
    if principal != user_id {
        warn!(%user_id, %principal, "upgrade token belongs to another user");
        return Err(GatewayError::AuthenticationFailed(
            "credential does not belong to this user".to_string(),
        ));
    }
    Ok(Admission::Authenticated)
}

async fn handle_socket(socket: WebSocket, hub: Hub, user_id: String, admission: Admission) {
    let (sender, receiver) = socket.split();
    let (session, outbox) = hub.open_session(user_id.clone(), admission);
    let connection_id = session.handle().id();
    info!(%user_id, connection_id, ?admission, "websocket connected");

    let writer = tokio::spawn(write_events(sender, outbox));

    let frames = Box::pin(receiver.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
            Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
            Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(error) => Some(Err(error)),
        })
    }));

    session.run(frames).await;

    if let Err(error) = writer.await {
        warn!(%user_id, connection_id, %error, "websocket writer task failed");
    }
    debug!(%user_id, connection_id, "websocket finished");
}

async fn write_events<S>(mut sender: S, mut outbox: Outbox)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(event) = outbox.recv().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(error) => {
                warn!(connection_id = outbox.id(), %error, "failed to serialise outbound event");
                continue;
            }
        };

        if let Err(error) = sender.send(Message::Text(text)).await {
            debug!(connection_id = outbox.id(), %error, "websocket write failed");
            outbox.close();
            return;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}
