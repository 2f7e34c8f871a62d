use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_types::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One live transport session.
///
/// Every send goes through the connection's outbound queue; a single writer
/// task drains it, so frames from concurrent senders never interleave.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub username: Option<String>,
    pub authenticated: bool,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl Connection {
    /// A pending connection and the receiving end of its outbound queue.
    pub fn new(remote_addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id: ConnectionId::new(),
            username: None,
            authenticated: false,
            remote_addr,
            connected_at: Utc::now(),
            outbound,
        };
        (conn, rx)
    }

    /// Queue an envelope for this connection. Returns false once the writer is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.outbound.send(envelope).is_ok()
    }

    /// The bound username, if this connection has authenticated.
    pub fn identity(&self) -> Option<&str> {
        self.username.as_deref().filter(|_| self.authenticated)
    }
}

/// Live connections keyed by id. Implementations must be safe to call from
/// any number of connection tasks at once.
pub trait ConnectionRegistry: Send + Sync {
    fn add(&self, conn: Connection);

    fn remove(&self, id: ConnectionId) -> Option<Connection>;

    fn get(&self, id: ConnectionId) -> Option<Connection>;

    /// Binds `username` and flips the connection to authenticated. Returns
    /// false if the connection is gone. Does not check for duplicate names.
    fn authenticate(&self, id: ConnectionId, username: &str) -> bool;

    /// Authenticated connection bound to `username`, if any. Linear scan.
    fn find_by_username(&self, username: &str) -> Option<Connection>;

    fn all_authenticated(&self) -> Vec<Connection>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry backed by a sharded concurrent map.
#[derive(Default)]
pub struct SharedRegistry {
    connections: DashMap<ConnectionId, Connection>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for SharedRegistry {
    fn add(&self, conn: Connection) {
        self.connections.insert(conn.id, conn);
    }

    fn remove(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).map(|r| r.value().clone())
    }

    fn authenticate(&self, id: ConnectionId, username: &str) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut entry) => {
                entry.username = Some(username.to_string());
                entry.authenticated = true;
                true
            }
            None => false,
        }
    }

    fn find_by_username(&self, username: &str) -> Option<Connection> {
        self.connections
            .iter()
            .find(|r| r.value().identity() == Some(username))
            .map(|r| r.value().clone())
    }

    fn all_authenticated(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|r| r.value().authenticated)
            .map(|r| r.value().clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn pending_connections_are_invisible_to_lookups() {
        let registry = SharedRegistry::new();
        let (conn, _rx) = Connection::new(addr());
        let id = conn.id;
        registry.add(conn);

        assert_eq!(registry.len(), 1);
        assert!(registry.all_authenticated().is_empty());
        assert!(registry.find_by_username("alice").is_none());

        assert!(registry.authenticate(id, "alice"));
        let found = registry.find_by_username("alice").unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.identity(), Some("alice"));
        assert_eq!(registry.all_authenticated().len(), 1);
    }

    #[test]
    fn remove_returns_the_entry_once() {
        let registry = SharedRegistry::new();
        let (conn, _rx) = Connection::new(addr());
        let id = conn.id;
        registry.add(conn);

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(!registry.authenticate(id, "ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn send_fails_after_receiver_drops() {
        let (conn, rx) = Connection::new(addr());
        assert!(conn.send(Envelope::system(parley_types::Kind::Typing, None, serde_json::Value::Null)));
        drop(rx);
        assert!(!conn.send(Envelope::system(parley_types::Kind::Typing, None, serde_json::Value::Null)));
    }

    #[test]
    fn concurrent_mutation_from_many_threads() {
        let registry = Arc::new(SharedRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let (conn, rx) = Connection::new(addr());
                    let id = conn.id;
                    registry.add(conn);
                    registry.authenticate(id, &format!("user{}", i));
                    if i % 2 == 0 {
                        registry.remove(id);
                    }
                    rx
                })
            })
            .collect();
        let _receivers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 8);
        let mut names: Vec<String> = registry
            .all_authenticated()
            .into_iter()
            .filter_map(|c| c.username)
            .collect();
        names.sort();
        assert_eq!(names.len(), 8);
        assert!(names.iter().all(|n| {
            let i: usize = n.trim_start_matches("user").parse().unwrap();
            i % 2 == 1
        }));
    }
}
