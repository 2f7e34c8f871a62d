use std::fmt;

use serde::{Deserialize, Serialize};

// -- Auth --

/// Content of an inbound `Register` or `LoginAttempt` envelope. Extra fields
/// such as `email` are accepted and ignored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Content of a successful `Register`/`LoginAttempt` reply.
pub const AUTH_SUCCESS: &str = "SUCCESS";

/// Error strings sent back as envelope content. Login never tells an unknown
/// user apart from a wrong password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidInput,
    UsernameExists,
    InvalidCredentials,
    NotAuthenticated,
    AlreadyConnected,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "ERROR:INVALID_INPUT",
            Self::UsernameExists => "ERROR:USERNAME_EXISTS",
            Self::InvalidCredentials => "ERROR:INVALID_CREDENTIALS",
            Self::NotAuthenticated => "ERROR:NOT_AUTHENTICATED",
            Self::AlreadyConnected => "ERROR:ALREADY_CONNECTED",
            Self::ServerError => "ERROR:SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- History --

/// Most messages a single `GetHistory` returns.
pub const HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

impl HistoryQuery {
    /// Requested limit clamped to `1..=HISTORY_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(HISTORY_LIMIT).clamp(1, HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_password() {
        let creds = Credentials {
            username: "alice".into(),
            password: "hunter22".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter22"));
    }

    #[test]
    fn error_codes_render_as_wire_strings() {
        assert_eq!(ErrorCode::InvalidCredentials.to_string(), "ERROR:INVALID_CREDENTIALS");
        assert_eq!(ErrorCode::NotAuthenticated.as_str(), "ERROR:NOT_AUTHENTICATED");
    }

    #[test]
    fn history_limit_is_clamped() {
        assert_eq!(HistoryQuery::default().effective_limit(), 100);
        assert_eq!(HistoryQuery { limit: Some(500) }.effective_limit(), 100);
        assert_eq!(HistoryQuery { limit: Some(0) }.effective_limit(), 1);
        assert_eq!(HistoryQuery { limit: Some(20) }.effective_limit(), 20);
    }
}
