use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Failures of the user store. None of these are retried by callers.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt {column} on user {id}: {message}")]
    Corrupt {
        id: i64,
        column: &'static str,
        message: String,
    },

    #[error("DB lock poisoned: {0}")]
    LockPoisoned(String),
}
