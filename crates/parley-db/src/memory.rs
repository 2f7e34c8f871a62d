use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::info;

use parley_types::models::Session;
use parley_types::store::{LoginVerdict, Registration, Store, StoreError, StoreResult};
use parley_types::{Envelope, Profile};

use crate::password::Passwords;

struct Account {
    password_hash: String,
    profile: Profile,
    last_seen: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    messages: Vec<Envelope>,
    sessions: HashMap<String, Session>,
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    passwords: Passwords,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(passwords: Passwords) -> Self {
        Self {
            passwords,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {}", e)))
    }

    pub fn sessions_for(&self, username: &str) -> StoreResult<Vec<Session>> {
        Ok(self
            .state()?
            .sessions
            .values()
            .filter(|s| s.username == username)
            .cloned()
            .collect())
    }

    pub fn last_seen(&self, username: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.state()?.accounts.get(username).and_then(|a| a.last_seen))
    }

    pub fn message_count(&self) -> StoreResult<usize> {
        Ok(self.state()?.messages.len())
    }
}

impl Store for MemoryStore {
    fn register_user(&self, username: &str, password: &str) -> StoreResult<Registration> {
        if self.state()?.accounts.contains_key(username) {
            return Ok(Registration::Conflict);
        }

        // Hash outside the lock, then re-check on insert
        let password_hash = self
            .passwords
            .hash(password)
            .map_err(|e| StoreError::Unavailable(format!("{:#}", e)))?;

        match self.state()?.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Ok(Registration::Conflict),
            Entry::Vacant(slot) => {
                slot.insert(Account {
                    password_hash,
                    profile: Profile::new(username),
                    last_seen: None,
                });
                info!("User registered: {}", username);
                Ok(Registration::Created)
            }
        }
    }

    fn login_user(&self, username: &str, password: &str) -> StoreResult<LoginVerdict> {
        let Some(stored) = self
            .state()?
            .accounts
            .get(username)
            .map(|a| a.password_hash.clone())
        else {
            return Ok(LoginVerdict::Rejected);
        };

        if !self.passwords.verify(password, &stored) {
            return Ok(LoginVerdict::Rejected);
        }

        if let Some(account) = self.state()?.accounts.get_mut(username) {
            account.last_seen = Some(Utc::now());
        }
        Ok(LoginVerdict::Verified)
    }

    fn get_user_profile(&self, username: &str) -> StoreResult<Option<Profile>> {
        Ok(self.state()?.accounts.get(username).map(|a| a.profile.clone()))
    }

    fn update_user_profile(&self, profile: &Profile) -> StoreResult<()> {
        if let Some(account) = self.state()?.accounts.get_mut(&profile.username) {
            let stored = &mut account.profile;
            stored.avatar = profile.avatar.clone();
            stored.avatar_kind = profile.avatar_kind.clone();
            stored.bio = profile.bio.clone();
            stored.phone = profile.phone.clone();
            stored.custom_status = profile.custom_status.clone();
        }
        Ok(())
    }

    fn save_message(&self, message: &Envelope) -> StoreResult<()> {
        self.state()?.messages.push(message.clone());
        Ok(())
    }

    fn get_message_history(&self, user_a: &str, user_b: &str, limit: u32) -> StoreResult<Vec<Envelope>> {
        let state = self.state()?;
        let mut history: Vec<Envelope> = state
            .messages
            .iter()
            .filter(|m| {
                let to = m.to.as_deref().unwrap_or_default();
                (m.from == user_a && to == user_b) || (m.from == user_b && to == user_a)
            })
            .cloned()
            .collect();

        // Stable sort keeps insertion order for equal timestamps
        history.sort_by_key(|m| m.timestamp);
        let skip = history.len().saturating_sub(limit as usize);
        Ok(history.split_off(skip))
    }

    fn mark_messages_as_read(&self, from: &str, to: &str) -> StoreResult<usize> {
        let mut state = self.state()?;
        let mut updated = 0;
        for m in state
            .messages
            .iter_mut()
            .filter(|m| m.from == from && m.to.as_deref() == Some(to) && !m.read)
        {
            m.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    fn create_session(&self, id: &str, username: &str, address: &str) -> StoreResult<()> {
        let now = Utc::now();
        self.state()?.sessions.insert(
            id.to_string(),
            Session {
                id: id.to_string(),
                username: username.to_string(),
                address: address.to_string(),
                connected_at: now,
                last_activity: now,
            },
        );
        Ok(())
    }

    fn touch_session(&self, id: &str) -> StoreResult<()> {
        if let Some(session) = self.state()?.sessions.get_mut(id) {
            session.last_activity = Utc::now();
        }
        Ok(())
    }

    fn remove_session(&self, id: &str) -> StoreResult<()> {
        self.state()?.sessions.remove(id);
        Ok(())
    }
}
