use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use parley_types::store::Store;
use parley_types::{Envelope, ErrorCode, Kind, ProtocolError, SYSTEM_SENDER};

use crate::auth::AuthGate;
use crate::blocking;
use crate::broadcaster::Broadcaster;
use crate::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::router::MessageRouter;

/// Entry point for connection loops: owns the registry, the auth gate, the
/// router and the broadcaster, and wires them to one store.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
    auth: AuthGate,
    router: MessageRouter,
}

impl Relay {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, store: Arc<dyn Store>) -> Self {
        let broadcaster = Broadcaster::new(registry.clone());
        let auth = AuthGate::new(registry.clone(), store.clone(), broadcaster.clone());
        let router = MessageRouter::new(registry.clone(), store.clone(), broadcaster.clone());
        Self {
            inner: Arc::new(RelayInner {
                registry,
                store,
                broadcaster,
                auth,
                router,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.inner.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    /// Register a new pending connection. The receiver is its outbound queue.
    pub fn open(&self, remote_addr: SocketAddr) -> (ConnectionId, mpsc::UnboundedReceiver<Envelope>) {
        let (conn, rx) = Connection::new(remote_addr);
        let id = conn.id;
        self.inner.registry.add(conn);
        info!(
            "Connection {} opened from {} (total: {})",
            id,
            remote_addr,
            self.inner.registry.len()
        );
        (id, rx)
    }

    /// Legacy connect: trust the `username` query parameter with no password.
    ///
    /// On failure an error envelope is queued; the caller should flush it and
    /// close the connection.
    pub async fn claim_legacy(&self, id: ConnectionId, username: &str) -> Result<(), ErrorCode> {
        let Some(conn) = self.inner.registry.get(id) else {
            return Ok(());
        };

        let username = username.trim();
        let result = if username.is_empty() || username == SYSTEM_SENDER {
            Err(ErrorCode::InvalidInput)
        } else {
            self.inner.auth.promote(&conn, username, None).await
        };

        if let Err(code) = result {
            conn.send(Envelope::system(Kind::Login, None, json!(code.as_str())));
        }
        result
    }

    /// Parse and handle one text frame. A frame that is not an envelope at
    /// all is returned as an error; the caller ends the connection.
    pub async fn handle_text(&self, id: ConnectionId, text: &str) -> Result<(), ProtocolError> {
        let envelope = Envelope::parse(text)?;
        self.handle_envelope(id, envelope).await;
        Ok(())
    }

    pub async fn handle_envelope(&self, id: ConnectionId, envelope: Envelope) {
        let Some(conn) = self.inner.registry.get(id) else {
            return;
        };

        match conn.identity().map(str::to_string) {
            Some(username) => {
                let session_id = id.to_string();
                if let Err(e) =
                    blocking(&self.inner.store, move |store| store.touch_session(&session_id)).await
                {
                    warn!("Failed to touch session {} for {}: {}", id, username, e);
                }
                self.inner.router.route(&conn, &username, envelope).await
            }
            None => self.inner.auth.handle(&conn, envelope).await,
        }
    }

    /// Drop the connection. Authenticated ones also lose their session record
    /// and trigger a user list rebroadcast.
    pub async fn close(&self, id: ConnectionId) {
        let Some(conn) = self.inner.registry.remove(id) else {
            return;
        };

        info!(
            "Connection {} from {} closed (total: {})",
            id,
            conn.remote_addr,
            self.inner.registry.len()
        );

        let Some(username) = conn.identity().map(str::to_string) else {
            return;
        };

        let session_id = id.to_string();
        if let Err(e) = blocking(&self.inner.store, move |store| store.remove_session(&session_id)).await {
            error!("Failed to remove session {} for {}: {}", id, username, e);
        }

        if self.inner.registry.find_by_username(&username).is_none() {
            self.inner.broadcaster.forget_profile(&username);
        }
        self.inner.broadcaster.snapshot_user_list();
        info!("{} disconnected", username);
    }
}
