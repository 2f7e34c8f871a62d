use crate::Database;
use crate::models::{MessageRow, ProfileRow, SessionRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode};

impl Database {
    // -- Users --

    /// Inserts a user. Returns `false` when the username is already taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        avatar: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, avatar) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, avatar),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn touch_last_seen(&self, username: &str, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?1 WHERE username = ?2",
                (now, username),
            )?;
            Ok(())
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, username: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, username))
    }

    /// Writes the editable profile columns. Premium columns are never touched here.
    pub fn update_profile(&self, row: &ProfileRow) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET avatar = ?1, avatar_kind = ?2, bio = ?3, phone = ?4, custom_status = ?5
                 WHERE username = ?6",
                rusqlite::params![
                    row.avatar,
                    row.avatar_kind,
                    row.bio,
                    row.phone,
                    row.custom_status,
                    row.username
                ],
            )?;
            Ok(changed)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, from_user, to_user, kind, content, sent_at, is_read, is_edited,
                     reply_to, attachments, reactions, poll, location)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    row.id,
                    row.from_user,
                    row.to_user,
                    row.kind,
                    row.content,
                    row.sent_at,
                    row.is_read,
                    row.is_edited,
                    row.reply_to,
                    row.attachments,
                    row.reactions,
                    row.poll,
                    row.location
                ],
            )?;
            Ok(())
        })
    }

    /// Newest `limit` messages between the pair, returned oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut rows = query_conversation(conn, user_a, user_b, limit)?;
            rows.reverse();
            Ok(rows)
        })
    }

    pub fn mark_read(&self, from: &str, to: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE from_user = ?1 AND to_user = ?2 AND is_read = 0",
                (from, to),
            )?;
            Ok(updated)
        })
    }

    // -- Sessions --

    pub fn insert_session(&self, id: &str, username: &str, address: &str, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, username, address, connected_at, last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (id, username, address, now),
            )?;
            Ok(())
        })
    }

    pub fn touch_session_activity(&self, id: &str, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET last_activity = ?1 WHERE id = ?2",
                (now, id),
            )?;
            Ok(())
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn get_sessions_for(&self, username: &str) -> Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, address, connected_at, last_activity
                 FROM sessions WHERE username = ?1",
            )?;
            let rows = stmt
                .query_map([username], |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        address: row.get(2)?,
                        connected_at: row.get(3)?,
                        last_activity: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_profile(conn: &Connection, username: &str) -> Result<Option<ProfileRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, avatar, avatar_kind, bio, phone, custom_status,
                premium, premium_emoji, premium_badge, premium_expires_at
         FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(ProfileRow {
                username: row.get(0)?,
                avatar: row.get(1)?,
                avatar_kind: row.get(2)?,
                bio: row.get(3)?,
                phone: row.get(4)?,
                custom_status: row.get(5)?,
                premium: row.get(6)?,
                premium_emoji: row.get(7)?,
                premium_badge: row.get(8)?,
                premium_expires_at: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation(conn: &Connection, user_a: &str, user_b: &str, limit: u32) -> Result<Vec<MessageRow>> {
    // sent_at is fixed-width RFC 3339, so text order is time order; seq breaks ties
    let mut stmt = conn.prepare(
        "SELECT id, from_user, to_user, kind, content, sent_at, is_read, is_edited,
                reply_to, attachments, reactions, poll, location
         FROM messages
         WHERE (from_user = ?1 AND to_user = ?2)
            OR (from_user = ?2 AND to_user = ?1)
         ORDER BY sent_at DESC, seq DESC
         LIMIT ?3",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_a, user_b, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                from_user: row.get(1)?,
                to_user: row.get(2)?,
                kind: row.get(3)?,
                content: row.get(4)?,
                sent_at: row.get(5)?,
                is_read: row.get(6)?,
                is_edited: row.get(7)?,
                reply_to: row.get(8)?,
                attachments: row.get(9)?,
                reactions: row.get(10)?,
                poll: row.get(11)?,
                location: row.get(12)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
