use crate::auth::TokenVerifier;
use crate::handler::ConnectionHandler;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

/// Build the router exposing the realtime endpoint at `/session`
pub fn create_session_route(
    handler: ConnectionHandler,
    verifier: Arc<dyn TokenVerifier>,
) -> Router {
    Router::new().route(
        "/session",
        get(move |ws: WebSocketUpgrade, Query(params): Query<ConnectParams>| {
            handle_websocket(
                ws,
                params,
                ConnectionHandler::new_from(&handler),
                verifier.clone(),
            )
        }),
    )
}

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    params: ConnectParams,
    handler: ConnectionHandler,
    verifier: Arc<dyn TokenVerifier>,
) -> impl IntoResponse {
    if !verifier.verify(params.token.as_deref()) {
        warn!("rejecting connection with invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| listen(socket, handler))
        .into_response()
}

async fn listen(socket: WebSocket, handler: ConnectionHandler) {
    let (ws_sender, ws_receiver) = socket.split();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = handler.with_sender(tx);

    let sender_task = handle_outgoing_messages(rx, ws_sender);
    let receiver_task = handle_incoming_messages(ws_receiver, &handler);

    tokio::select! {
        _ = sender_task => {
            info!(peer_id = %handler.peer_id(), "sender task completed");
        }
        _ = receiver_task => {
            info!(peer_id = %handler.peer_id(), "receiver task completed");
        }
    }
    if let Err(e) = handler.disconnect().await {
        error!(error = %e, "failed to disconnect peer");
    }
}

async fn handle_outgoing_messages(
    mut rx: UnboundedReceiver<String>,
    mut ws_sender: SplitSink<WebSocket, Message>,
) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
            error!(error = %e, "failed to send message");
            break;
        }
    }
}

async fn handle_incoming_messages(
    mut receiver: SplitStream<WebSocket>,
    handler: &ConnectionHandler,
) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(e) = handler.handle_text(text.as_str()).await {
                    warn!(peer_id = %handler.peer_id(), error = %e, "frame rejected");
                }
            }
            Ok(Message::Close(_)) => {
                info!(peer_id = %handler.peer_id(), "peer closed connection");
                break;
            }
            Ok(other) => {
                debug!(peer_id = %handler.peer_id(), "ignoring message: {other:?}");
            }
            Err(e) => {
                error!(error = %e, "failed to receive message");
                break;
            }
        }
    }
}
