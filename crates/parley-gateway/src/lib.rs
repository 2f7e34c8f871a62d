//! The parley relay core: connection registry, auth handshake, envelope
//! routing and presence broadcast, plus the axum WebSocket loop driving them.

pub mod auth;
pub mod broadcaster;
pub mod connection;
pub mod registry;
pub mod relay;
pub mod router;

use std::sync::Arc;

use parley_types::store::{Store, StoreError, StoreResult};

pub use registry::{Connection, ConnectionId, ConnectionRegistry, SharedRegistry};
pub use relay::Relay;

/// Run a store call on the blocking pool so it never stalls other connections.
pub(crate) async fn blocking<T, F>(store: &Arc<dyn Store>, f: F) -> StoreResult<T>
where
    F: FnOnce(&dyn Store) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {}", e)))?
}
