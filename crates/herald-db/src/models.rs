//! Database row types. These map directly to SQLite rows and are converted
//! into the shared `herald-types` models at the crate boundary.

use chrono::{DateTime, Utc};
use herald_types::models::{BanInfo, LogEntry, UserProfile, UserRecord};
use rusqlite::Row;

use crate::{Result, StorageError};

pub(crate) const USER_COLUMNS: &str = "id, username, first_name, last_name, language_code, is_bot, \
     is_banned, ban_reason, banned_by, banned_at, joined_at, last_seen, stickers, custom_data";

pub struct UserRow {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub banned_by: Option<i64>,
    pub banned_at: Option<String>,
    pub joined_at: String,
    pub last_seen: String,
    pub stickers: String,
    pub custom_data: String,
}

impl UserRow {
    /// Expects the column order of [`USER_COLUMNS`].
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            language_code: row.get(4)?,
            is_bot: row.get(5)?,
            is_banned: row.get(6)?,
            ban_reason: row.get(7)?,
            banned_by: row.get(8)?,
            banned_at: row.get(9)?,
            joined_at: row.get(10)?,
            last_seen: row.get(11)?,
            stickers: row.get(12)?,
            custom_data: row.get(13)?,
        })
    }
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self> {
        let id = row.id;
        let corrupt = |column: &'static str, message: String| StorageError::Corrupt {
            id,
            column,
            message,
        };

        let ban = if row.is_banned {
            let banned_at = match row.banned_at.as_deref() {
                Some(ts) => parse_timestamp(ts).map_err(|e| corrupt("banned_at", e))?,
                None => parse_timestamp(&row.last_seen).map_err(|e| corrupt("last_seen", e))?,
            };
            Some(BanInfo {
                reason: row.ban_reason.unwrap_or_default(),
                banned_by: row.banned_by.unwrap_or_default(),
                banned_at,
            })
        } else {
            None
        };

        Ok(UserRecord {
            id,
            profile: UserProfile {
                id,
                username: row.username,
                first_name: row.first_name,
                last_name: row.last_name,
                language_code: row.language_code,
                is_bot: row.is_bot,
            },
            is_banned: row.is_banned,
            ban,
            joined_at: parse_timestamp(&row.joined_at).map_err(|e| corrupt("joined_at", e))?,
            last_seen: parse_timestamp(&row.last_seen).map_err(|e| corrupt("last_seen", e))?,
            stickers: serde_json::from_str(&row.stickers)
                .map_err(|e| corrupt("stickers", e.to_string()))?,
            extra: serde_json::from_str(&row.custom_data)
                .map_err(|e| corrupt("custom_data", e.to_string()))?,
        })
    }
}

pub struct LogRow {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub details: String,
    pub created_at: String,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = StorageError;

    fn try_from(row: LogRow) -> Result<Self> {
        let created_at = parse_timestamp(&row.created_at).map_err(|message| StorageError::Corrupt {
            id: row.user_id,
            column: "logs.created_at",
            message,
        })?;
        Ok(LogEntry {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            details: row.details,
            created_at,
        })
    }
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            // Rows written by SQLite's datetime('now') have no offset.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| format!("'{}': {}", raw, e))
}
