use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Avatar kind used when an account has never uploaded an image.
pub const DEFAULT_AVATAR_KIND: &str = "emoji";

/// A user's public profile. Owned by the store; the relay only caches it
/// for presence broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default = "default_avatar_kind")]
    pub avatar_kind: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub custom_status: Option<String>,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub premium_emoji: Option<String>,
    #[serde(default)]
    pub premium_badge: Option<String>,
    #[serde(default)]
    pub premium_expires_at: Option<DateTime<Utc>>,
}

fn default_avatar_kind() -> String {
    DEFAULT_AVATAR_KIND.to_string()
}

impl Profile {
    /// The profile a freshly registered account starts with: the first letter
    /// of the name as an emoji-style avatar.
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            avatar: Some(default_avatar(username)),
            avatar_kind: default_avatar_kind(),
            bio: None,
            phone: None,
            custom_status: None,
            premium: false,
            premium_emoji: None,
            premium_badge: None,
            premium_expires_at: None,
        }
    }
}

/// First letter of the username, upper-cased.
pub fn default_avatar(username: &str) -> String {
    username
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
    Busy,
    DoNotDisturb,
}

/// One row of a `UserList` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub username: String,
    pub status: PresenceStatus,
    pub avatar: String,
    pub avatar_kind: String,
    pub bio: Option<String>,
    pub custom_status: Option<String>,
    pub premium: bool,
    pub last_seen: DateTime<Utc>,
}

impl PresenceEntry {
    /// Online entry for `username`, filled from its profile when one is cached.
    pub fn online(username: &str, profile: Option<&Profile>, now: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            status: PresenceStatus::Online,
            avatar: profile
                .and_then(|p| p.avatar.clone())
                .unwrap_or_else(|| default_avatar(username)),
            avatar_kind: profile
                .map(|p| p.avatar_kind.clone())
                .unwrap_or_else(default_avatar_kind),
            bio: profile.and_then(|p| p.bio.clone()),
            custom_status: profile.and_then(|p| p.custom_status.clone()),
            premium: profile.is_some_and(|p| p.premium),
            last_seen: now,
        }
    }
}

/// Persisted link between a live connection and the identity it authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub username: String,
    pub address: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub multiple_choice: bool,
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub voters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_avatar_is_uppercased_initial() {
        assert_eq!(default_avatar("alice"), "A");
        assert_eq!(default_avatar("élan"), "É");
        assert_eq!(default_avatar(""), "");
    }

    #[test]
    fn presence_falls_back_without_profile() {
        let now = Utc::now();
        let entry = PresenceEntry::online("bob", None, now);
        assert_eq!(entry.avatar, "B");
        assert_eq!(entry.avatar_kind, DEFAULT_AVATAR_KIND);
        assert_eq!(entry.status, PresenceStatus::Online);
        assert!(!entry.premium);
    }

    #[test]
    fn presence_uses_profile_fields() {
        let mut profile = Profile::new("carol");
        profile.avatar = Some("data:image/png;base64,AAAA".into());
        profile.avatar_kind = "image".into();
        profile.bio = Some("hi".into());
        profile.premium = true;

        let entry = PresenceEntry::online("carol", Some(&profile), Utc::now());
        assert_eq!(entry.avatar_kind, "image");
        assert_eq!(entry.bio.as_deref(), Some("hi"));
        assert!(entry.premium);
    }
}
