use thiserror::Error;

use crate::envelope::Envelope;
use crate::models::Profile;

/// Failure inside a storage adapter. Conflicts and bad credentials are not
/// errors; they come back as values.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// The username is already taken.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginVerdict {
    Verified,
    /// Unknown user or wrong password; deliberately not distinguished.
    Rejected,
}

/// Durable storage for accounts, profiles, the message log and sessions.
///
/// Methods block; async callers run them on the blocking pool.
pub trait Store: Send + Sync + 'static {
    /// Creates the account with a salted argon2 hash of `password`.
    fn register_user(&self, username: &str, password: &str) -> StoreResult<Registration>;

    fn login_user(&self, username: &str, password: &str) -> StoreResult<LoginVerdict>;

    fn get_user_profile(&self, username: &str) -> StoreResult<Option<Profile>>;

    /// Updates the editable fields of `profile.username`'s profile. Premium
    /// fields are left alone.
    fn update_user_profile(&self, profile: &Profile) -> StoreResult<()>;

    fn save_message(&self, message: &Envelope) -> StoreResult<()>;

    /// Messages between exactly `user_a` and `user_b`, either direction, the
    /// newest `limit` of them in ascending timestamp order.
    fn get_message_history(
        &self,
        user_a: &str,
        user_b: &str,
        limit: u32,
    ) -> StoreResult<Vec<Envelope>>;

    /// Marks unread messages `from -> to` as read. Returns how many changed.
    fn mark_messages_as_read(&self, from: &str, to: &str) -> StoreResult<usize>;

    fn create_session(&self, id: &str, username: &str, address: &str) -> StoreResult<()>;

    /// Refreshes the session's last activity time. Unknown ids are ignored.
    fn touch_session(&self, id: &str) -> StoreResult<()>;

    fn remove_session(&self, id: &str) -> StoreResult<()>;
}
