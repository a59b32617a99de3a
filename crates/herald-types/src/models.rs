use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Profile fields copied from the platform on every contact.
/// Only used for display; the broadcast path never reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanInfo {
    pub reason: String,
    pub banned_by: i64,
    pub banned_at: DateTime<Utc>,
}

/// A sticker saved to a user's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerEntry {
    pub file_id: String,
    pub emoji: Option<String>,
    pub file_size: Option<u64>,
    pub is_animated: bool,
    pub is_video: bool,
    pub saved_at: DateTime<Utc>,
}

/// One row of the recipient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub profile: UserProfile,
    pub is_banned: bool,
    pub ban: Option<BanInfo>,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub stickers: Vec<StickerEntry>,
    /// Forward-compatible extension data. Everything with a known meaning
    /// gets its own field above.
    pub extra: Map<String, Value>,
}

/// How the platform should render a message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Plain,
    Html,
    Markdown,
}

impl MessageFormat {
    /// Value for the Bot API `parse_mode` field, `None` for plain text.
    pub fn parse_mode(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Html => Some("HTML"),
            Self::Markdown => Some("Markdown"),
        }
    }

    pub fn is_rich(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Immutable payload of a broadcast job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub text: String,
    pub format: MessageFormat,
}

impl BroadcastMessage {
    pub fn new(text: impl Into<String>, format: MessageFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    pub total: u64,
    pub joined_today: u64,
    pub banned: u64,
    pub last_backup: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_matches_bot_api_names() {
        assert_eq!(MessageFormat::Plain.parse_mode(), None);
        assert_eq!(MessageFormat::Html.parse_mode(), Some("HTML"));
        assert_eq!(MessageFormat::Markdown.parse_mode(), Some("Markdown"));
        assert!(!MessageFormat::Plain.is_rich());
        assert!(MessageFormat::Html.is_rich());
    }

    #[test]
    fn full_name_skips_missing_last_name() {
        let mut profile = UserProfile {
            id: 1,
            first_name: "Ada".into(),
            ..Default::default()
        };
        assert_eq!(profile.full_name(), "Ada");

        profile.last_name = Some("Lovelace".into());
        assert_eq!(profile.full_name(), "Ada Lovelace");
    }
}
