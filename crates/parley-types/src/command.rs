use serde_json::Value;
use thiserror::Error;

use crate::api::{Credentials, HistoryQuery};
use crate::envelope::{Envelope, Kind};
use crate::models::Profile;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0:?} envelope needs a recipient")]
    MissingRecipient(Kind),

    #[error("{kind:?} content is invalid: {reason}")]
    InvalidContent { kind: Kind, reason: String },
}

/// An inbound envelope validated against its kind.
#[derive(Debug, Clone)]
pub enum Command {
    Register(Credentials),
    LoginAttempt(Credentials),

    /// Chat message; the envelope is kept whole for persistence and forwarding.
    Text(Envelope),

    /// Ephemeral typing indicator for `to`.
    Typing(Envelope),

    /// The sender has read everything `to` sent them.
    Read(Envelope),

    GetHistory { with: String, query: HistoryQuery },

    ProfileUpdate(Profile),
    AvatarUpdate(Profile),

    /// Best-effort relay to `to` (StatusUpdate, Reaction, Delivered).
    Forward(Envelope),

    /// Server-to-client kinds (UserList, History) sent by a client.
    ServerOnly(Kind),

    /// Reserved kinds: parsed, never dispatched.
    Reserved(Kind),
}

impl Credentials {
    /// Accepts `{username, password}` content, or a bare password string with
    /// the username in `from`.
    pub fn from_envelope(env: &Envelope) -> Result<Self, ProtocolError> {
        match &env.content {
            Value::String(password) => Ok(Self {
                username: env.from.clone(),
                password: password.clone(),
            }),
            Value::Null => Ok(Self {
                username: env.from.clone(),
                password: String::new(),
            }),
            other => serde_json::from_value(other.clone()).map_err(|e| invalid(env.kind, e)),
        }
    }

    /// Both fields present once surrounding whitespace is ignored on the name.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl TryFrom<Envelope> for Command {
    type Error = ProtocolError;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        let kind = env.kind;
        let command = match kind {
            Kind::Register => Command::Register(Credentials::from_envelope(&env)?),
            Kind::LoginAttempt => Command::LoginAttempt(Credentials::from_envelope(&env)?),

            Kind::Text => {
                require_recipient(&env)?;
                if !(env.content.is_string() || env.content.is_null()) {
                    return Err(invalid(kind, "text content must be a string"));
                }
                Command::Text(env)
            }
            Kind::Typing => {
                require_recipient(&env)?;
                Command::Typing(env)
            }
            Kind::Read => {
                require_recipient(&env)?;
                Command::Read(env)
            }
            Kind::GetHistory => {
                let with = require_recipient(&env)?.to_string();
                let query = match env.content {
                    Value::Null => HistoryQuery::default(),
                    other => serde_json::from_value(other).map_err(|e| invalid(kind, e))?,
                };
                Command::GetHistory { with, query }
            }
            Kind::ProfileUpdate | Kind::AvatarUpdate => {
                let profile: Profile =
                    serde_json::from_value(env.content).map_err(|e| invalid(kind, e))?;
                if kind == Kind::ProfileUpdate {
                    Command::ProfileUpdate(profile)
                } else {
                    Command::AvatarUpdate(profile)
                }
            }
            Kind::StatusUpdate => {
                require_recipient(&env)?;
                if !env.content.is_string() {
                    return Err(invalid(kind, "status must be a string"));
                }
                Command::Forward(env)
            }
            Kind::Reaction | Kind::Delivered => {
                require_recipient(&env)?;
                Command::Forward(env)
            }
            Kind::UserList | Kind::History => Command::ServerOnly(kind),
            reserved => Command::Reserved(reserved),
        };
        Ok(command)
    }
}

fn require_recipient(env: &Envelope) -> Result<&str, ProtocolError> {
    env.to
        .as_deref()
        .filter(|to| !to.trim().is_empty())
        .ok_or(ProtocolError::MissingRecipient(env.kind))
}

fn invalid(kind: Kind, reason: impl ToString) -> ProtocolError {
    ProtocolError::InvalidContent {
        kind,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> Result<Command, ProtocolError> {
        Command::try_from(Envelope::parse(text).unwrap())
    }

    #[test]
    fn credentials_from_object_content() {
        let cmd = command(
            r#"{"kind":"Register","content":{"username":"alice","password":"secret1"}}"#,
        )
        .unwrap();
        let Command::Register(creds) = cmd else { panic!("expected Register") };
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "secret1");
        assert!(creds.is_complete());
    }

    #[test]
    fn credentials_ignore_extra_fields() {
        let cmd = command(
            r#"{"kind":"Register","content":{"username":"alice","password":"secret1","email":"a@example.org"}}"#,
        )
        .unwrap();
        let Command::Register(creds) = cmd else { panic!("expected Register") };
        assert_eq!(creds.username, "alice");
        assert!(creds.is_complete());
    }

    #[test]
    fn credentials_from_legacy_shape() {
        let cmd = command(r#"{"kind":"LoginAttempt","from":"bob","content":"pw1234"}"#).unwrap();
        let Command::LoginAttempt(creds) = cmd else { panic!("expected LoginAttempt") };
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password, "pw1234");
    }

    #[test]
    fn empty_credentials_are_incomplete() {
        let Command::Register(creds) = command(r#"{"kind":"Register","from":"bob"}"#).unwrap() else {
            panic!("expected Register")
        };
        assert!(!creds.is_complete());

        let Command::Register(creds) =
            command(r#"{"kind":"Register","content":{"username":"  ","password":"x"}}"#).unwrap()
        else {
            panic!("expected Register")
        };
        assert!(!creds.is_complete());
    }

    #[test]
    fn text_requires_recipient_and_string_content() {
        assert!(matches!(
            command(r#"{"kind":"Text","content":"hi"}"#),
            Err(ProtocolError::MissingRecipient(Kind::Text))
        ));
        assert!(matches!(
            command(r#"{"kind":"Text","to":"bob","content":{"nested":true}}"#),
            Err(ProtocolError::InvalidContent { kind: Kind::Text, .. })
        ));
        assert!(matches!(
            command(r#"{"kind":"Text","to":"bob","content":"hi"}"#),
            Ok(Command::Text(_))
        ));
    }

    #[test]
    fn history_query_defaults_and_parses() {
        let Command::GetHistory { with, query } =
            command(r#"{"kind":"GetHistory","to":"bob"}"#).unwrap()
        else {
            panic!("expected GetHistory")
        };
        assert_eq!(with, "bob");
        assert_eq!(query.effective_limit(), 100);

        let Command::GetHistory { query, .. } =
            command(r#"{"kind":"GetHistory","to":"bob","content":{"limit":5}}"#).unwrap()
        else {
            panic!("expected GetHistory")
        };
        assert_eq!(query.effective_limit(), 5);
    }

    #[test]
    fn profile_content_is_an_object_not_a_json_string() {
        let cmd = command(
            r#"{"kind":"ProfileUpdate","content":{"bio":"rustacean","avatar_kind":"image"}}"#,
        )
        .unwrap();
        let Command::ProfileUpdate(profile) = cmd else { panic!("expected ProfileUpdate") };
        assert_eq!(profile.bio.as_deref(), Some("rustacean"));

        assert!(command(r#"{"kind":"AvatarUpdate","content":"{\"bio\":\"x\"}"}"#).is_err());
    }

    #[test]
    fn server_only_and_reserved_kinds() {
        assert!(matches!(
            command(r#"{"kind":"UserList"}"#),
            Ok(Command::ServerOnly(Kind::UserList))
        ));
        assert!(matches!(
            command(r#"{"kind":"VideoCall","to":"bob"}"#),
            Ok(Command::Reserved(Kind::VideoCall))
        ));
    }

    #[test]
    fn forwardable_kinds() {
        assert!(matches!(
            command(r#"{"kind":"Reaction","to":"bob","content":"+1","reply_to":"m1"}"#),
            Ok(Command::Forward(_))
        ));
        assert!(matches!(
            command(r#"{"kind":"StatusUpdate","to":"bob","content":"busy"}"#),
            Ok(Command::Forward(_))
        ));
        assert!(command(r#"{"kind":"StatusUpdate","to":"bob","content":3}"#).is_err());
    }
}
