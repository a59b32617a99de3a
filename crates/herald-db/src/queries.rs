use chrono::Utc;
use herald_types::models::{LogEntry, StickerEntry, UserProfile, UserRecord, UserStats};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};

use crate::models::{LogRow, USER_COLUMNS, UserRow, format_timestamp, parse_timestamp};
use crate::{Database, Result, StorageError};

impl Database {
    // -- Users --

    /// Record a contact from `profile`. Creates the row on first contact,
    /// otherwise refreshes the profile fields and `last_seen` only.
    /// Returns `true` when the user was new.
    pub fn upsert_user(&self, profile: &UserProfile) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let existed: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [profile.id],
                |row| row.get(0),
            )?;

            conn.execute(
                "INSERT INTO users (id, username, first_name, last_name, language_code, is_bot, joined_at, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    language_code = excluded.language_code,
                    is_bot = excluded.is_bot,
                    last_seen = excluded.last_seen",
                params![
                    profile.id,
                    profile.username,
                    profile.first_name,
                    profile.last_name,
                    profile.language_code,
                    profile.is_bot,
                    now,
                ],
            )?;

            Ok(!existed)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        let row = self.with_conn(|conn| query_user(conn, id))?;
        row.map(UserRecord::try_from).transpose()
    }

    /// Bump `last_seen`. Returns `false` when the user is unknown.
    pub fn touch(&self, id: i64) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_seen = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Point-in-time copy of the recipient table, ordered by id.
    ///
    /// Read in a single statement, so every record reflects its last
    /// committed value. Later bans do not alter a snapshot already taken.
    pub fn snapshot(&self, include_banned: bool) -> Result<Vec<UserRecord>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE ?1 OR is_banned = 0 ORDER BY id",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([include_banned], UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(UserRecord::try_from).collect()
    }

    /// Flag `id` as banned. Banning again overwrites reason, admin and time.
    /// An id the store has never seen gets a placeholder row so the ban
    /// holds once that user shows up.
    pub fn set_banned(&self, id: i64, reason: &str, banned_by: i64) -> Result<()> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, is_banned, ban_reason, banned_by, banned_at, joined_at, last_seen)
                 VALUES (?1, 1, ?2, ?3, ?4, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    is_banned = 1,
                    ban_reason = excluded.ban_reason,
                    banned_by = excluded.banned_by,
                    banned_at = excluded.banned_at",
                params![id, reason, banned_by, now],
            )?;
            Ok(())
        })
    }

    /// Clear the ban flag. Returns whether the user had been banned;
    /// unbanning anyone else is a successful no-op.
    pub fn clear_banned(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET is_banned = 0, ban_reason = NULL, banned_by = NULL, banned_at = NULL
                 WHERE id = ?1 AND is_banned = 1",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn banned_users(&self) -> Result<Vec<UserRecord>> {
        let rows = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE is_banned = 1 ORDER BY banned_at DESC",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(UserRecord::try_from).collect()
    }

    /// Append to the user's sticker collection. Returns `false` when the
    /// user is unknown.
    pub fn add_sticker(&self, id: i64, sticker: &StickerEntry) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let raw: Option<String> = tx
                .query_row("SELECT stickers FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(raw) = raw else {
                return Ok(false);
            };

            let mut stickers: Vec<StickerEntry> =
                serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                    id,
                    column: "stickers",
                    message: e.to_string(),
                })?;
            stickers.push(sticker.clone());
            let encoded = serde_json::to_string(&stickers).map_err(|e| StorageError::Corrupt {
                id,
                column: "stickers",
                message: e.to_string(),
            })?;

            tx.execute(
                "UPDATE users SET stickers = ?1 WHERE id = ?2",
                params![encoded, id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Set one key of the user's extension map. Returns `false` when the
    /// user is unknown.
    pub fn set_extra(&self, id: i64, key: &str, value: Value) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let raw: Option<String> = tx
                .query_row("SELECT custom_data FROM users WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(raw) = raw else {
                return Ok(false);
            };

            let corrupt = |e: serde_json::Error| StorageError::Corrupt {
                id,
                column: "custom_data",
                message: e.to_string(),
            };
            let mut extra: Map<String, Value> = serde_json::from_str(&raw).map_err(corrupt)?;
            extra.insert(key.to_string(), value);
            let encoded = serde_json::to_string(&extra).map_err(corrupt)?;

            tx.execute(
                "UPDATE users SET custom_data = ?1 WHERE id = ?2",
                params![encoded, id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn stats(&self) -> Result<UserStats> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let (total, joined_today, banned, last_backup) = self.with_conn(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let joined_today: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE substr(joined_at, 1, 10) = ?1",
                [&today],
                |row| row.get(0),
            )?;
            let banned: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE is_banned = 1",
                [],
                |row| row.get(0),
            )?;
            let last_backup: Option<String> =
                conn.query_row("SELECT MAX(created_at) FROM backups", [], |row| row.get(0))?;
            Ok((total, joined_today, banned, last_backup))
        })?;

        let last_backup = last_backup
            .map(|ts| {
                parse_timestamp(&ts).map_err(|message| StorageError::Corrupt {
                    id: 0,
                    column: "backups.created_at",
                    message,
                })
            })
            .transpose()?;

        Ok(UserStats {
            total: total as u64,
            joined_today: joined_today as u64,
            banned: banned as u64,
            last_backup,
        })
    }

    // -- Activity log --

    pub fn add_log(&self, user_id: i64, action: &str, details: &str) -> Result<()> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO logs (user_id, action, details, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, action, details, now],
            )?;
            Ok(())
        })
    }

    /// Newest first.
    pub fn recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, action, details, created_at
                 FROM logs
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(LogRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        action: row.get(2)?,
                        details: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(LogEntry::try_from).collect()
    }
}

fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], UserRow::from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64, name: &str) -> UserProfile {
        UserProfile {
            id,
            username: Some(name.to_lowercase()),
            first_name: name.to_string(),
            ..Default::default()
        }
    }

    fn seeded(ids: &[i64]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for &id in ids {
            db.upsert_user(&profile(id, &format!("User{}", id))).unwrap();
        }
        db
    }

    fn ids(records: &[UserRecord]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn upsert_creates_then_updates_profile() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.upsert_user(&profile(1, "Ada")).unwrap());

        let first = db.get_user(1).unwrap().unwrap();
        assert!(!db.upsert_user(&profile(1, "Grace")).unwrap());

        let second = db.get_user(1).unwrap().unwrap();
        assert_eq!(second.profile.first_name, "Grace");
        assert_eq!(second.joined_at, first.joined_at);
        assert!(second.last_seen >= first.last_seen);
        assert!(second.stickers.is_empty());
        assert!(second.extra.is_empty());
    }

    #[test]
    fn touch_only_updates_known_users() {
        let db = seeded(&[1]);
        let before = db.get_user(1).unwrap().unwrap();

        assert!(db.touch(1).unwrap());
        assert!(!db.touch(2).unwrap());
        assert!(db.get_user(2).unwrap().is_none());

        let after = db.get_user(1).unwrap().unwrap();
        assert!(after.last_seen >= before.last_seen);
        assert_eq!(after.profile, before.profile);
    }

    #[test]
    fn snapshot_excludes_banned_unless_asked() {
        let db = seeded(&[3, 1, 2]);
        db.set_banned(2, "spam", 99).unwrap();

        let active = db.snapshot(false).unwrap();
        assert_eq!(ids(&active), vec![1, 3]);
        assert!(active.iter().all(|r| !r.is_banned));

        let all = db.snapshot(true).unwrap();
        assert_eq!(ids(&all), vec![1, 2, 3]);
        let banned = all.iter().find(|r| r.id == 2).unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.ban.as_ref().unwrap().reason, "spam");
    }

    #[test]
    fn rebanning_overwrites_reason() {
        let db = seeded(&[1]);
        db.set_banned(1, "first", 10).unwrap();
        db.set_banned(1, "second", 11).unwrap();

        let ban = db.get_user(1).unwrap().unwrap().ban.unwrap();
        assert_eq!(ban.reason, "second");
        assert_eq!(ban.banned_by, 11);
        assert_eq!(db.banned_users().unwrap().len(), 1);
    }

    #[test]
    fn unban_is_idempotent() {
        let db = seeded(&[1]);
        assert!(!db.clear_banned(1).unwrap());
        assert!(!db.clear_banned(404).unwrap());

        db.set_banned(1, "spam", 10).unwrap();
        assert!(db.clear_banned(1).unwrap());
        assert!(!db.clear_banned(1).unwrap());

        let record = db.get_user(1).unwrap().unwrap();
        assert!(!record.is_banned);
        assert!(record.ban.is_none());
    }

    #[test]
    fn ban_before_first_contact_survives_upsert() {
        let db = Database::open_in_memory().unwrap();
        db.set_banned(7, "known spammer", 1).unwrap();
        assert!(!db.upsert_user(&profile(7, "Mallory")).unwrap());

        let record = db.get_user(7).unwrap().unwrap();
        assert!(record.is_banned);
        assert_eq!(record.profile.first_name, "Mallory");
        assert!(db.snapshot(false).unwrap().is_empty());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_bans() {
        let db = seeded(&[1, 2]);
        let snapshot = db.snapshot(false).unwrap();
        db.set_banned(2, "late", 1).unwrap();

        assert_eq!(ids(&snapshot), vec![1, 2]);
        assert_eq!(ids(&db.snapshot(false).unwrap()), vec![1]);
    }

    #[test]
    fn stickers_and_extra_round_through_json_columns() {
        let db = seeded(&[1]);
        let sticker = StickerEntry {
            file_id: "CAAD".into(),
            emoji: Some("🔥".into()),
            file_size: Some(1024),
            is_animated: true,
            is_video: false,
            saved_at: Utc::now(),
        };
        assert!(db.add_sticker(1, &sticker).unwrap());
        assert!(db.add_sticker(1, &sticker).unwrap());
        assert!(!db.add_sticker(2, &sticker).unwrap());

        assert!(db.set_extra(1, "start_param", Value::from("promo")).unwrap());
        assert!(!db.set_extra(2, "start_param", Value::from("promo")).unwrap());

        let record = db.get_user(1).unwrap().unwrap();
        assert_eq!(record.stickers.len(), 2);
        assert_eq!(record.stickers[0].file_id, "CAAD");
        assert_eq!(record.extra.get("start_param"), Some(&Value::from("promo")));
    }

    #[test]
    fn corrupt_json_column_surfaces_as_storage_error() {
        let db = seeded(&[1]);
        db.with_conn(|conn| {
            conn.execute("UPDATE users SET stickers = 'not json' WHERE id = 1", [])?;
            Ok(())
        })
        .unwrap();

        let err = db.snapshot(false).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { id: 1, column: "stickers", .. }));
    }

    #[test]
    fn stats_counts_users_and_bans() {
        let db = seeded(&[1, 2, 3]);
        db.set_banned(3, "spam", 1).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.joined_today, 3);
        assert_eq!(stats.banned, 1);
        assert!(stats.last_backup.is_none());
    }

    #[test]
    fn recent_logs_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.add_log(1, "start_command", "first").unwrap();
        db.add_log(2, "ban_user", "second").unwrap();
        db.add_log(3, "unban_user", "third").unwrap();

        let logs = db.recent_logs(2).unwrap();
        let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(actions, vec!["unban_user", "ban_user"]);
    }
}
