//! Relay WebSocket handler
//!
//! Upgrades the browser connection and hands it to a [`RelaySession`]. This
//! module only pumps frames: the session decides what every frame means.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::core::session::RelaySession;
use crate::state::{AppState, ConnectionSlot};

use super::messages::{DownstreamFrame, DownstreamRoute};

/// Channel buffer between the session and the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How long the writer may take to flush the final envelopes after the session ends
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay WebSocket handler
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state
/// * `slot` - Admission slot from the connection limit middleware. It moves
///   into the upgrade callback, so it is released even if the upgrade fails.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let slot = slot.map(|Extension(slot)| slot);
    debug!(ip = ?slot.as_ref().map(ConnectionSlot::ip), "Relay WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, slot))
}

async fn handle_relay_socket(socket: WebSocket, state: Arc<AppState>, slot: Option<ConnectionSlot>) {
    let (mut sender, receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<DownstreamRoute>(CHANNEL_BUFFER_SIZE);

    // Writer task: the only place that touches the socket's send half
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                DownstreamRoute::Envelope(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing envelope: {}", e);
                        continue;
                    }
                },
                DownstreamRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Client socket write failed: {}", e);
                break;
            }
        }
    });

    let incoming = std::pin::pin!(receiver.filter_map(|message| async move {
        match message {
            Ok(Message::Text(text)) => Some(DownstreamFrame::Text(text.as_str().to_owned())),
            Ok(Message::Binary(data)) => {
                debug!("Ignoring binary frame: {} bytes", data.len());
                None
            }
            Ok(Message::Close(_)) => Some(DownstreamFrame::Close),
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
            Err(e) => {
                warn!("Relay WebSocket error: {}", e);
                Some(DownstreamFrame::Close)
            }
        }
    }));

    let mut session = RelaySession::new(state.live_config(), Arc::clone(state.sessions()));
    let session_id = session.id();
    info!(%session_id, "Relay WebSocket connection established");

    session.run(incoming, route_tx).await;
    drop(session);

    if timeout(SENDER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
        sender_task.abort();
    }

    drop(slot);

    info!(%session_id, "Relay WebSocket connection terminated");
}
