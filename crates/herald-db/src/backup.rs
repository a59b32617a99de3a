use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;
use tracing::{info, warn};

use crate::models::format_timestamp;
use crate::{Database, Result};

impl Database {
    /// Write a consistent copy of the database into `dir` and record it in
    /// the backup ledger. Only the newest `max_backups` copies are kept, and
    /// never fewer than the one just written.
    pub fn backup(&self, dir: &Path, max_backups: usize) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let now = Utc::now();
        self.with_conn(|conn| {
            let seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(id), 0) + 1 FROM backups",
                [],
                |row| row.get(0),
            )?;
            let path = dir.join(format!(
                "backup_{}_{:04}.db",
                now.format("%Y%m%d_%H%M%S"),
                seq
            ));

            let target = path.to_string_lossy().into_owned();
            conn.execute("VACUUM INTO ?1", [&target])?;
            let size = std::fs::metadata(&path)?.len();

            conn.execute(
                "INSERT INTO backups (path, size_bytes, created_at) VALUES (?1, ?2, ?3)",
                params![target, size as i64, format_timestamp(now)],
            )?;
            info!("Backup written to {} ({} bytes)", path.display(), size);

            let mut stmt = conn.prepare("SELECT id, path FROM backups ORDER BY id DESC")?;
            let stale = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .skip(max_backups.max(1))
                .collect::<Vec<_>>();

            for (id, old) in stale {
                match std::fs::remove_file(&old) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove old backup {}: {}", old, e),
                }
                conn.execute("DELETE FROM backups WHERE id = ?1", [id])?;
            }

            Ok(path)
        })
    }
}
