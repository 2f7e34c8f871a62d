use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use parley_types::{Envelope, Kind, PresenceEntry, Profile};

use crate::registry::{Connection, ConnectionRegistry};

/// Fans envelopes out to authenticated connections and keeps the presence
/// list current.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<dyn ConnectionRegistry>,
    /// Transient profile cache feeding presence entries: username -> profile
    profiles: Arc<DashMap<String, Profile>>,
    /// Held while a user list is built and queued, so a stale snapshot can
    /// never be delivered after a newer one.
    snapshot_order: Arc<Mutex<()>>,
}

impl Broadcaster {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            registry,
            profiles: Arc::new(DashMap::new()),
            snapshot_order: Arc::new(Mutex::new(())),
        }
    }

    pub fn cache_profile(&self, profile: Profile) {
        self.profiles.insert(profile.username.clone(), profile);
    }

    pub fn forget_profile(&self, username: &str) {
        self.profiles.remove(username);
    }

    pub fn cached_profile(&self, username: &str) -> Option<Profile> {
        self.profiles.get(username).map(|p| p.value().clone())
    }

    /// One entry per authenticated username, sorted by name.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        let now = Utc::now();
        let mut entries = BTreeMap::new();
        for conn in self.registry.all_authenticated() {
            if let Some(username) = conn.identity() {
                let profile = self.cached_profile(username);
                entries
                    .entry(username.to_string())
                    .or_insert_with(|| PresenceEntry::online(username, profile.as_ref(), now));
            }
        }
        entries.into_values().collect()
    }

    fn user_list(&self) -> Envelope {
        let content = serde_json::to_value(self.presence()).unwrap_or_else(|e| {
            warn!("Failed to encode presence list: {}", e);
            serde_json::Value::Array(Vec::new())
        });
        Envelope::system(Kind::UserList, None, content)
    }

    /// Sends every cached profile except the connection's own as a
    /// `ProfileUpdate`, so a newcomer sees fields the user list leaves out.
    /// Returns how many were queued.
    pub fn send_profiles_to(&self, conn: &Connection) -> usize {
        let own = conn.identity();
        let profiles: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|p| Some(p.key().as_str()) != own)
            .map(|p| p.value().clone())
            .collect();

        let mut sent = 0;
        for profile in profiles {
            match serde_json::to_value(&profile) {
                Ok(content) => {
                    if conn.send(Envelope::system(Kind::ProfileUpdate, own, content)) {
                        sent += 1;
                    }
                }
                Err(e) => warn!("Failed to encode profile for {}: {}", profile.username, e),
            }
        }
        sent
    }

    /// Sends the current user list to one connection only.
    pub fn send_user_list_to(&self, conn: &Connection) {
        let _order = self.lock_order();
        let mut list = self.user_list();
        list.to = conn.identity().map(str::to_string);
        conn.send(list);
    }

    /// Rebuilds the user list and sends it to every authenticated connection.
    /// Returns how many connections it was queued for.
    pub fn snapshot_user_list(&self) -> usize {
        let _order = self.lock_order();
        let list = self.user_list();
        let sent = self.broadcast(list);
        debug!("User list broadcast to {} connections", sent);
        sent
    }

    /// Sends a `ProfileUpdate` carrying `profile` to every authenticated connection.
    pub fn broadcast_profile(&self, profile: &Profile) -> usize {
        match serde_json::to_value(profile) {
            Ok(content) => self.broadcast(Envelope::system(Kind::ProfileUpdate, None, content)),
            Err(e) => {
                warn!("Failed to encode profile for {}: {}", profile.username, e);
                0
            }
        }
    }

    /// Queues `envelope` for every authenticated connection.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        self.registry
            .all_authenticated()
            .iter()
            .filter(|conn| conn.send(envelope.clone()))
            .count()
    }

    fn lock_order(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock is still usable
        self.snapshot_order
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
