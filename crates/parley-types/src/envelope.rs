use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Location, Poll};

/// Sender name reserved for server-originated envelopes.
pub const SYSTEM_SENDER: &str = "System";

/// Every kind a frame may carry. Kinds after `Reaction` are reserved: the
/// parser accepts them but the relay never dispatches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Text,
    Register,
    LoginAttempt,
    UserList,
    Typing,
    Delivered,
    Read,
    GetHistory,
    History,
    ProfileUpdate,
    AvatarUpdate,
    StatusUpdate,
    Reaction,

    // Reserved
    Login,
    Logout,
    Image,
    File,
    VoiceCall,
    VideoCall,
    Voice,
    Forward,
    GroupCreate,
    GroupMessage,
    Pinned,
    Deleted,
    Animation,
    Sticker,
    Poll,
    Location,
    Contact,
    Music,
    Video,
    ScreenShare,
    GameInvite,
    Payment,
    Reminder,
    Schedule,
}

impl Kind {
    pub fn is_reserved(self) -> bool {
        !matches!(
            self,
            Kind::Text
                | Kind::Register
                | Kind::LoginAttempt
                | Kind::UserList
                | Kind::Typing
                | Kind::Delivered
                | Kind::Read
                | Kind::GetHistory
                | Kind::History
                | Kind::ProfileUpdate
                | Kind::AvatarUpdate
                | Kind::StatusUpdate
                | Kind::Reaction
        )
    }
}

/// The unit of wire communication: one JSON object per text frame.
///
/// `content` is kept as a JSON value here; `Command::try_from` turns an
/// inbound envelope into a typed payload for its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub kind: Kind,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// username -> reaction symbol
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Envelope {
    pub fn new(kind: Kind, from: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: None,
            kind,
            content,
            timestamp: Utc::now(),
            read: false,
            edited: false,
            reply_to: None,
            attachments: Vec::new(),
            reactions: BTreeMap::new(),
            poll: None,
            location: None,
        }
    }

    /// A server-originated envelope addressed to `to`.
    pub fn system(kind: Kind, to: Option<&str>, content: serde_json::Value) -> Self {
        let mut env = Self::new(kind, SYSTEM_SENDER, content);
        env.to = to.map(str::to_string);
        env
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// `content` when it is a JSON string, otherwise empty.
    pub fn content_str(&self) -> &str {
        self.content.as_str().unwrap_or_default()
    }

    /// Fill in an id if the sender left it empty.
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_frame_with_defaults() {
        let env = Envelope::parse(r#"{"kind":"Typing","to":"bob"}"#).unwrap();
        assert_eq!(env.kind, Kind::Typing);
        assert_eq!(env.to.as_deref(), Some("bob"));
        assert!(env.id.is_empty());
        assert!(env.content.is_null());
        assert!(env.attachments.is_empty());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(Envelope::parse(r#"{"kind":"Teleport"}"#).is_err());
        assert!(Envelope::parse(r#"{"to":"bob"}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn optional_fields_are_omitted_on_the_wire() {
        let env = Envelope::system(Kind::Delivered, Some("alice"), json!("m-1"));
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["from"], SYSTEM_SENDER);
        assert_eq!(wire["kind"], "Delivered");
        assert_eq!(wire["content"], "m-1");
        assert!(wire.get("reply_to").is_none());
        assert!(wire.get("reactions").is_none());
    }

    #[test]
    fn ensure_id_keeps_sender_id() {
        let mut env = Envelope::parse(r#"{"id":"abc","kind":"Text"}"#).unwrap();
        env.ensure_id();
        assert_eq!(env.id, "abc");

        let mut env = Envelope::parse(r#"{"kind":"Text"}"#).unwrap();
        env.ensure_id();
        assert!(Uuid::parse_str(&env.id).is_ok());
    }

    #[test]
    fn reserved_kinds() {
        assert!(Kind::VoiceCall.is_reserved());
        assert!(Kind::GroupMessage.is_reserved());
        assert!(!Kind::Reaction.is_reserved());
        assert!(!Kind::Text.is_reserved());
    }
}
