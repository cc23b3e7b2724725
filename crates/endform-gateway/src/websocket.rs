//! WebSocket handler for live state streaming.

use crate::live::{StateUpdate, StateUpdater};
use crate::metrics::GatewayMetrics;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(updater): Extension<StateUpdater>,
    Extension(metrics): Extension<Arc<GatewayMetrics>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, updater, metrics))
}

async fn handle_socket(socket: WebSocket, updater: StateUpdater, metrics: Arc<GatewayMetrics>) {
    info!("WebSocket client connected");
    metrics.websocket_clients.inc();

    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = updater.subscribe();

    let initial = StateUpdate::Full(updater.snapshot());
    if let Ok(json) = serde_json::to_string(&initial) {
        if sender.send(Message::Text(json)).await.is_err() {
            warn!("Failed to send initial state to WebSocket client");
            metrics.websocket_clients.dec();
            return;
        }
    }

    let send_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(update) => {
                    if let Ok(json) = serde_json::to_string(&update) {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "WebSocket client lagged, dropped updates");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // The panel only listens; inbound traffic is drained until close.
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client sent close");
                    break;
                }
                Ok(Message::Text(text)) => {
                    debug!(text = %text, "Ignoring WebSocket message");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => debug!("WebSocket send task ended"),
        _ = recv_task => debug!("WebSocket receive task ended"),
    }

    metrics.websocket_clients.dec();
    info!("WebSocket client disconnected");
}
