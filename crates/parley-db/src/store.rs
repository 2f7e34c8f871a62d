use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::models::default_avatar;
use parley_types::store::{LoginVerdict, Registration, Store, StoreError, StoreResult};
use parley_types::{Envelope, Kind, Profile};

use crate::Database;
use crate::models::{MessageRow, ProfileRow};

impl Store for Database {
    fn register_user(&self, username: &str, password: &str) -> StoreResult<Registration> {
        // Cheap pre-check so a taken name doesn't pay for a hash
        if self.get_user_by_username(username).map_err(unavailable)?.is_some() {
            return Ok(Registration::Conflict);
        }

        let hash = self.passwords.hash(password).map_err(unavailable)?;
        let id = Uuid::new_v4().to_string();
        let created = self
            .create_user(&id, username, &hash, &default_avatar(username))
            .map_err(unavailable)?;

        if created {
            info!("User registered: {}", username);
            Ok(Registration::Created)
        } else {
            Ok(Registration::Conflict)
        }
    }

    fn login_user(&self, username: &str, password: &str) -> StoreResult<LoginVerdict> {
        let Some(user) = self.get_user_by_username(username).map_err(unavailable)? else {
            return Ok(LoginVerdict::Rejected);
        };

        if !self.passwords.verify(password, &user.password) {
            return Ok(LoginVerdict::Rejected);
        }

        self.touch_last_seen(&user.username, &timestamp(Utc::now()))
            .map_err(unavailable)?;
        Ok(LoginVerdict::Verified)
    }

    fn get_user_profile(&self, username: &str) -> StoreResult<Option<Profile>> {
        let Some(row) = self.get_profile(username).map_err(unavailable)? else {
            return Ok(None);
        };

        let premium_expires_at = row
            .premium_expires_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(Some(Profile {
            username: row.username,
            avatar: row.avatar,
            avatar_kind: row.avatar_kind,
            bio: row.bio,
            phone: row.phone,
            custom_status: row.custom_status,
            premium: row.premium,
            premium_emoji: row.premium_emoji,
            premium_badge: row.premium_badge,
            premium_expires_at,
        }))
    }

    fn update_user_profile(&self, profile: &Profile) -> StoreResult<()> {
        let row = ProfileRow {
            username: profile.username.clone(),
            avatar: profile.avatar.clone(),
            avatar_kind: profile.avatar_kind.clone(),
            bio: profile.bio.clone(),
            phone: profile.phone.clone(),
            custom_status: profile.custom_status.clone(),
            premium: false,
            premium_emoji: None,
            premium_badge: None,
            premium_expires_at: None,
        };
        let changed = self.update_profile(&row).map_err(unavailable)?;
        if changed == 0 {
            warn!("Profile update for unknown user {}", profile.username);
        }
        Ok(())
    }

    fn save_message(&self, message: &Envelope) -> StoreResult<()> {
        let row = MessageRow {
            id: message.id.clone(),
            from_user: message.from.clone(),
            to_user: message.to.clone().unwrap_or_default(),
            kind: kind_name(message.kind)?,
            content: encode(&message.content)?,
            sent_at: timestamp(message.timestamp),
            is_read: message.read,
            is_edited: message.edited,
            reply_to: message.reply_to.clone(),
            attachments: encode_nonempty(&message.attachments, message.attachments.is_empty())?,
            reactions: encode_nonempty(&message.reactions, message.reactions.is_empty())?,
            poll: message.poll.as_ref().map(encode).transpose()?,
            location: message.location.as_ref().map(encode).transpose()?,
        };
        self.insert_message(&row).map_err(unavailable)
    }

    fn get_message_history(&self, user_a: &str, user_b: &str, limit: u32) -> StoreResult<Vec<Envelope>> {
        self.get_conversation(user_a, user_b, limit)
            .map_err(unavailable)?
            .into_iter()
            .map(envelope_from_row)
            .collect()
    }

    fn mark_messages_as_read(&self, from: &str, to: &str) -> StoreResult<usize> {
        let updated = self.mark_read(from, to).map_err(unavailable)?;
        if updated > 0 {
            info!("Marked {} messages {} -> {} as read", updated, from, to);
        }
        Ok(updated)
    }

    fn create_session(&self, id: &str, username: &str, address: &str) -> StoreResult<()> {
        self.insert_session(id, username, address, &timestamp(Utc::now()))
            .map_err(unavailable)
    }

    fn touch_session(&self, id: &str) -> StoreResult<()> {
        self.touch_session_activity(id, &timestamp(Utc::now()))
            .map_err(unavailable)
    }

    fn remove_session(&self, id: &str) -> StoreResult<()> {
        self.delete_session(id).map_err(unavailable)
    }
}

fn envelope_from_row(row: MessageRow) -> StoreResult<Envelope> {
    Ok(Envelope {
        kind: decode(&format!("\"{}\"", row.kind))?,
        content: decode(&row.content)?,
        timestamp: parse_timestamp(&row.sent_at)?,
        to: Some(row.to_user),
        read: row.is_read,
        edited: row.is_edited,
        reply_to: row.reply_to,
        attachments: row.attachments.as_deref().map(decode).transpose()?.unwrap_or_default(),
        reactions: row.reactions.as_deref().map(decode).transpose()?.unwrap_or_default(),
        poll: row.poll.as_deref().map(decode).transpose()?,
        location: row.location.as_deref().map(decode).transpose()?,
        id: row.id,
        from: row.from_user,
    })
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

fn kind_name(kind: Kind) -> StoreResult<String> {
    match serde_json::to_value(kind) {
        Ok(serde_json::Value::String(name)) => Ok(name),
        _ => Err(StoreError::Corrupt(format!("kind {:?} has no name", kind))),
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn encode_nonempty<T: Serialize>(value: &T, empty: bool) -> StoreResult<Option<String>> {
    if empty { Ok(None) } else { encode(value).map(Some) }
}

fn decode<T: DeserializeOwned>(raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn unavailable(e: anyhow::Error) -> StoreError {
    StoreError::Unavailable(format!("{:#}", e))
}
