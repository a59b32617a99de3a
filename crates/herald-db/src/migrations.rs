use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY,
            username        TEXT,
            first_name      TEXT NOT NULL DEFAULT '',
            last_name       TEXT,
            language_code   TEXT,
            is_bot          INTEGER NOT NULL DEFAULT 0,
            is_banned       INTEGER NOT NULL DEFAULT 0,
            ban_reason      TEXT,
            banned_by       INTEGER,
            banned_at       TEXT,
            joined_at       TEXT NOT NULL,
            last_seen       TEXT NOT NULL,
            stickers        TEXT NOT NULL DEFAULT '[]',
            custom_data     TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_users_banned
            ON users(is_banned);

        CREATE TABLE IF NOT EXISTS logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL,
            action      TEXT NOT NULL,
            details     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_logs_created
            ON logs(created_at);

        CREATE TABLE IF NOT EXISTS backups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            path        TEXT NOT NULL,
            size_bytes  INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
