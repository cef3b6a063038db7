use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::broadcast::ChatMessage;
use crate::connection_manager::{ConnectionHandle, ConnectionState, RegistryError};
use crate::error::AppError;
use crate::metrics::{ConnectionMetrics, MessageMetrics};
use crate::server::AppState;

use super::message::{going_away_frame, ChatEvent, OutboundMessage};

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if !state.connection_manager.is_accepting() {
        ConnectionMetrics::record_rejected();
        return AppError::from(RegistryError::ShuttingDown).into_response();
    }

    ws.max_message_size(state.settings.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_start = std::time::Instant::now();

    // Create channel for sending messages to this connection
    let (tx, mut rx) =
        mpsc::channel::<OutboundMessage>(state.settings.websocket.outbound_queue_capacity);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let handle = match state.connection_manager.register(tx) {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            ConnectionMetrics::record_rejected();
            let _ = ws_sender.send(going_away_frame()).await;
            let _ = ws_sender.close().await;
            return;
        }
    };
    let connection_id = handle.id;

    ConnectionMetrics::record_opened();
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Task for sending messages from channel to WebSocket
    let writer_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if write_frame(&mut ws_sender, msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = writer_handle.closed() => {
                    // Closing (shutdown): flush what is queued, then say goodbye.
                    // Closed (evicted): drop the queue and close without a reason.
                    let close_frame = if writer_handle.state() == ConnectionState::Closing {
                        while let Ok(msg) = rx.try_recv() {
                            if write_frame(&mut ws_sender, msg).await.is_err() {
                                break;
                            }
                        }
                        going_away_frame()
                    } else {
                        Message::Close(None)
                    };
                    let _ = ws_sender.send(close_frame).await;
                    let _ = ws_sender.close().await;
                    break;
                }
            }
        }
    });

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let reader_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &reader_handle) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then stop the other
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    state.connection_manager.unregister(connection_id);

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

async fn write_frame(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    msg: OutboundMessage,
) -> Result<(), axum::Error> {
    let frame = match msg.into_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            return Ok(());
        }
    };
    ws_sender.send(frame).await
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            match serde_json::from_str::<ChatEvent>(&text) {
                Ok(event) => {
                    MessageMetrics::record_received_chat();
                    state
                        .dispatcher
                        .dispatch(ChatMessage::new(handle.id, event.into_payload()));
                }
                Err(e) => {
                    MessageMetrics::record_received_ignored();
                    tracing::debug!(connection_id = %handle.id, error = %e, "Ignoring frame that is not a chat message");
                }
            }
            true
        }
        Message::Binary(_) => {
            MessageMetrics::record_received_ignored();
            tracing::debug!(connection_id = %handle.id, "Ignoring binary frame");
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; only activity matters here
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
