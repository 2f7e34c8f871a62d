//! Process wiring for the parley relay: configuration, store selection and
//! the HTTP router hosting the WebSocket endpoint.

pub mod app;
pub mod config;

use std::sync::Arc;

use parley_gateway::{ConnectionRegistry, Relay, SharedRegistry};
use parley_types::store::Store;

pub use config::{Config, StoreConfig};

/// A relay with a fresh, empty connection registry over `store`.
pub fn build_relay(store: Arc<dyn Store>) -> Relay {
    let registry: Arc<dyn ConnectionRegistry> = Arc::new(SharedRegistry::new());
    Relay::new(registry, store)
}
