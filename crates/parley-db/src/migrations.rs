use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            username            TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            avatar              TEXT,
            avatar_kind         TEXT NOT NULL DEFAULT 'emoji',
            bio                 TEXT,
            phone               TEXT,
            custom_status       TEXT,
            premium             INTEGER NOT NULL DEFAULT 0,
            premium_emoji       TEXT,
            premium_badge       TEXT,
            premium_expires_at  TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            last_seen           TEXT
        );

        -- Legacy connections may chat under names with no account row,
        -- so messages and sessions reference users by name only.
        -- Message ids come from clients and are only unique per conversation.
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL,
            from_user       TEXT NOT NULL,
            to_user         TEXT NOT NULL,
            kind            TEXT NOT NULL,
            content         TEXT NOT NULL,
            sent_at         TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            is_edited       INTEGER NOT NULL DEFAULT 0,
            reply_to        TEXT,
            attachments     TEXT,
            reactions       TEXT,
            poll            TEXT,
            location        TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(from_user, to_user, sent_at);

        CREATE INDEX IF NOT EXISTS idx_messages_id
            ON messages(id);

        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL,
            address         TEXT NOT NULL,
            connected_at    TEXT NOT NULL,
            last_activity   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_username
            ON sessions(username);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
