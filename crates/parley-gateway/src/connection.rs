use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::relay::Relay;

/// Drive one WebSocket for its whole life.
///
/// A writer task owns the socket's sink and drains the connection's outbound
/// queue, so every frame goes out whole and in queue order. A reader task
/// feeds inbound frames to the relay one at a time. When either side ends,
/// the other is aborted and the connection is removed from the relay.
///
/// With `legacy_username` the connection is authenticated by name at connect
/// time and skips the Register/Login handshake.
pub async fn handle_connection(
    socket: WebSocket,
    relay: Relay,
    remote_addr: SocketAddr,
    legacy_username: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound) = relay.open(remote_addr);

    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {:?} envelope: {}", envelope.kind, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    if let Some(username) = legacy_username {
        if relay.claim_legacy(conn_id, &username).await.is_err() {
            // Dropping the registry entry closes the queue once the error is flushed
            relay.close(conn_id).await;
            let _ = send_task.await;
            return;
        }
        info!("{} connected from {} (legacy mode)", username, remote_addr);
    }

    let relay_recv = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            let msg = match frame {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("Connection {} read error: {}", conn_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    if let Err(e) = relay_recv.handle_text(conn_id, text.as_str()).await {
                        warn!(
                            "Connection {} sent a bad frame: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        break;
                    }
                }
                Message::Binary(data) => {
                    debug!("Connection {} sent {} binary bytes; ignored", conn_id, data.len());
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    relay.close(conn_id).await;
}
