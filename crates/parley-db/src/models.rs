/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types wire models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct ProfileRow {
    pub username: String,
    pub avatar: Option<String>,
    pub avatar_kind: String,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub custom_status: Option<String>,
    pub premium: bool,
    pub premium_emoji: Option<String>,
    pub premium_badge: Option<String>,
    pub premium_expires_at: Option<String>,
}

/// A stored envelope. JSON-typed columns hold serde_json text.
pub struct MessageRow {
    pub id: String,
    pub from_user: String,
    pub to_user: String,
    pub kind: String,
    pub content: String,
    pub sent_at: String,
    pub is_read: bool,
    pub is_edited: bool,
    pub reply_to: Option<String>,
    pub attachments: Option<String>,
    pub reactions: Option<String>,
    pub poll: Option<String>,
    pub location: Option<String>,
}

pub struct SessionRow {
    pub id: String,
    pub username: String,
    pub address: String,
    pub connected_at: String,
    pub last_activity: String,
}
