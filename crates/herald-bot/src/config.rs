use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use herald_gateway::BroadcastConfig;
use thiserror::Error;

/// Token values from sample `.env` files that must never reach the API.
const PLACEHOLDER_TOKENS: &[&str] = &["change-me", "your-bot-token"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read once at startup and immutable afterwards.
#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: i64,
    pub admin_ids: Vec<i64>,
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    pub broadcast: BroadcastConfig,
    pub poll_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("owner_id", &self.owner_id)
            .field("admin_ids", &self.admin_ids)
            .field("db_path", &self.db_path)
            .field("backup_dir", &self.backup_dir)
            .field("max_backups", &self.max_backups)
            .field("broadcast", &self.broadcast)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("HERALD_BOT_TOKEN").ok_or(ConfigError::Missing("HERALD_BOT_TOKEN"))?;
        if PLACEHOLDER_TOKENS.contains(&bot_token.as_str()) {
            return Err(invalid("HERALD_BOT_TOKEN", &bot_token, "still a placeholder"));
        }

        let owner_raw = get("HERALD_OWNER_ID").ok_or(ConfigError::Missing("HERALD_OWNER_ID"))?;
        let owner_id = parse("HERALD_OWNER_ID", &owner_raw)?;

        let admin_ids = match get("HERALD_ADMIN_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| parse("HERALD_ADMIN_IDS", part))
                .collect::<Result<Vec<i64>, _>>()?,
            None => Vec::new(),
        };

        let db_path = get("HERALD_DB_PATH").unwrap_or_else(|| "herald.db".into()).into();
        let backup_dir = get("HERALD_BACKUP_DIR").unwrap_or_else(|| "backups".into()).into();
        let max_backups = parse_or("HERALD_MAX_BACKUPS", get("HERALD_MAX_BACKUPS"), 10usize)?;
        if max_backups == 0 {
            return Err(invalid("HERALD_MAX_BACKUPS", "0", "must be at least 1"));
        }

        let batch_size = parse_or(
            "HERALD_BROADCAST_BATCH_SIZE",
            get("HERALD_BROADCAST_BATCH_SIZE"),
            30usize,
        )?;
        if batch_size == 0 {
            return Err(invalid("HERALD_BROADCAST_BATCH_SIZE", "0", "must be at least 1"));
        }

        let inter_batch_delay = seconds(
            "HERALD_BROADCAST_DELAY_SECS",
            get("HERALD_BROADCAST_DELAY_SECS"),
            1.0,
        )?;
        let send_timeout = seconds(
            "HERALD_SEND_TIMEOUT_SECS",
            get("HERALD_SEND_TIMEOUT_SECS"),
            10.0,
        )?;
        if send_timeout.is_zero() {
            return Err(invalid("HERALD_SEND_TIMEOUT_SECS", "0", "must be positive"));
        }

        let poll_timeout = Duration::from_secs(parse_or(
            "HERALD_POLL_TIMEOUT_SECS",
            get("HERALD_POLL_TIMEOUT_SECS"),
            30u64,
        )?);

        Ok(Self {
            bot_token,
            owner_id,
            admin_ids,
            db_path,
            backup_dir,
            max_backups,
            broadcast: BroadcastConfig {
                batch_size,
                inter_batch_delay,
                send_timeout,
            },
            poll_timeout,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| invalid(key, raw, e.to_string()))
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

fn seconds(key: &'static str, raw: Option<String>, default: f64) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_or(key, raw.clone(), default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| invalid(key, raw.as_deref().unwrap_or_default(), e.to_string()))
}
