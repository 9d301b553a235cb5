//! Media-stream WebSocket connection lifecycle.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::adapter::{MediaSender, StreamAdapter};
use crate::state::GatewayState;

/// Handle one telephony media-stream connection until it closes.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "New media stream connection");
    state.connections.fetch_add(1, Ordering::Relaxed);
    #[cfg(feature = "metrics")]
    crate::metrics::record_ws_connect();

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut adapter = StreamAdapter::new(
        Arc::clone(&state),
        MediaSender::new(Arc::new(frame_tx)),
        conn_id.clone(),
    );

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                adapter.on_frame(text.as_str());
            }
            Ok(Message::Binary(_)) => {
                debug!(conn_id = %conn_id, "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client requested close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    adapter.close();
    send_task.abort();
    state.connections.fetch_sub(1, Ordering::Relaxed);
    #[cfg(feature = "metrics")]
    crate::metrics::record_ws_disconnect();
    info!(conn_id = %conn_id, "Media stream connection closed");
}
