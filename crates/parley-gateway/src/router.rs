use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use parley_types::api::HistoryQuery;
use parley_types::store::Store;
use parley_types::{Command, Envelope, Kind, Profile};

use crate::blocking;
use crate::broadcaster::Broadcaster;
use crate::registry::{Connection, ConnectionRegistry};

/// Dispatches envelopes from authenticated connections by kind.
pub struct MessageRouter {
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<dyn Store>,
    broadcaster: Broadcaster,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        store: Arc<dyn Store>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            registry,
            store,
            broadcaster,
        }
    }

    /// Route one envelope from `sender`, which is bound to `username`.
    ///
    /// The sender-supplied `from` and `timestamp` are replaced before anything
    /// else looks at the envelope.
    pub async fn route(&self, sender: &Connection, username: &str, mut envelope: Envelope) {
        envelope.from = username.to_string();
        envelope.timestamp = Utc::now();
        envelope.ensure_id();

        debug!(
            "{} -> {}: {:?}",
            username,
            envelope.to.as_deref().unwrap_or("*"),
            envelope.kind
        );

        let command = match Command::try_from(envelope) {
            Ok(command) => command,
            Err(e) => {
                warn!("{} sent an invalid envelope: {}", username, e);
                return;
            }
        };

        match command {
            Command::Text(envelope) => self.text(sender, envelope).await,
            Command::Typing(envelope) => {
                self.forward(envelope);
            }
            Command::Read(envelope) => self.read(envelope).await,
            Command::GetHistory { with, query } => self.history(sender, username, with, query).await,
            Command::ProfileUpdate(profile) | Command::AvatarUpdate(profile) => {
                self.profile(username, profile).await
            }
            Command::Forward(envelope) => {
                self.forward(envelope);
            }
            Command::Register(_) | Command::LoginAttempt(_) => {
                debug!("{} is already authenticated; ignoring auth envelope", username);
            }
            Command::ServerOnly(kind) => {
                warn!("{} sent server-only kind {:?}; dropped", username, kind);
            }
            Command::Reserved(kind) => {
                debug!("{} sent reserved kind {:?}; not dispatched", username, kind);
            }
        }
    }

    /// Best-effort delivery to the named recipient. Offline recipients are a
    /// silent drop: no queueing, no retry.
    fn forward(&self, envelope: Envelope) -> bool {
        let Some(to) = envelope.to.clone() else {
            return false;
        };
        match self.registry.find_by_username(&to) {
            Some(recipient) => recipient.send(envelope),
            None => {
                debug!("{} is offline; dropped {:?} from {}", to, envelope.kind, envelope.from);
                false
            }
        }
    }

    async fn text(&self, sender: &Connection, envelope: Envelope) {
        let message_id = envelope.id.clone();
        let author = envelope.from.clone();

        let record = envelope.clone();
        if let Err(e) = blocking(&self.store, move |store| store.save_message(&record)).await {
            error!("Failed to persist message {} from {}: {}", message_id, author, e);
        }

        self.forward(envelope);

        // Receipt goes back whether or not the recipient was online
        sender.send(Envelope::system(Kind::Delivered, Some(&author), json!(message_id)));
    }

    async fn read(&self, envelope: Envelope) {
        let reader = envelope.from.clone();
        let Some(author) = envelope.to.clone() else {
            return;
        };

        let (from, to) = (author.clone(), reader.clone());
        match blocking(&self.store, move |store| store.mark_messages_as_read(&from, &to)).await {
            Ok(n) => debug!("{} read {} messages from {}", reader, n, author),
            Err(e) => error!("Failed to mark {} -> {} read: {}", author, reader, e),
        }

        self.forward(envelope);
    }

    async fn history(&self, sender: &Connection, username: &str, with: String, query: HistoryQuery) {
        let limit = query.effective_limit();
        let (me, other) = (username.to_string(), with.clone());
        let messages = match blocking(&self.store, move |store| {
            store.get_message_history(&me, &other, limit)
        })
        .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("History {} <-> {} failed: {}", username, with, e);
                Vec::new()
            }
        };

        let content = json!({ "with": with, "messages": messages });
        sender.send(Envelope::system(Kind::History, Some(username), content));
    }

    async fn profile(&self, username: &str, mut profile: Profile) {
        profile.username = username.to_string();

        let update = profile.clone();
        if let Err(e) = blocking(&self.store, move |store| store.update_user_profile(&update)).await {
            error!("Failed to persist profile for {}: {}", username, e);
        }

        // Broadcast what the store now holds, so premium fields stay server-controlled
        let name = username.to_string();
        let profile = match blocking(&self.store, move |store| store.get_user_profile(&name)).await {
            Ok(Some(stored)) => stored,
            Ok(None) | Err(_) => Profile {
                premium: false,
                premium_emoji: None,
                premium_badge: None,
                premium_expires_at: None,
                ..profile
            },
        };

        info!("{} updated their profile", username);
        self.broadcaster.cache_profile(profile.clone());
        self.broadcaster.broadcast_profile(&profile);
        self.broadcaster.snapshot_user_list();
    }
}
