//! In-memory chat platform and fixtures for handler tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald_db::Database;
use herald_gateway::{BroadcastConfig, BroadcastDispatcher, ChatApi, SendCapability, SendError};
use herald_types::models::MessageFormat;
use herald_types::telegram::{
    CallbackQuery, Chat, ChatKind, InlineKeyboardMarkup, Message, Sticker, Update, User,
};

use crate::config::Config;
use crate::router::Bot;

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text {
        chat_id: i64,
        text: String,
        markup: Option<InlineKeyboardMarkup>,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    Answer {
        callback_id: String,
    },
    Sticker {
        chat_id: i64,
        file_id: String,
    },
    Photo {
        chat_id: i64,
        file_id: String,
    },
    Document {
        chat_id: i64,
        path: PathBuf,
    },
    Broadcast {
        recipient: i64,
        text: String,
        format: MessageFormat,
    },
}

#[derive(Default)]
pub struct RecordingApi {
    sent: Mutex<Vec<Outgoing>>,
    failing: Mutex<HashSet<i64>>,
    profile_photo: Mutex<Option<String>>,
}

impl RecordingApi {
    /// Every delivery to `chat_id` fails as if the user blocked the bot.
    pub fn fail_chat(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn set_profile_photo(&self, file_id: &str) {
        *self.profile_photo.lock().unwrap() = Some(file_id.to_string());
    }

    pub fn all(&self) -> Vec<Outgoing> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat: i64) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Text { chat_id, text, .. } if chat_id == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn broadcast_recipients(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .all()
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Broadcast { recipient, .. } => Some(recipient),
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }

    fn record(&self, chat_id: i64, outgoing: Outgoing) -> Result<(), SendError> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(SendError::Blocked);
        }
        self.sent.lock().unwrap().push(outgoing);
        Ok(())
    }
}

#[async_trait]
impl SendCapability for RecordingApi {
    async fn send(
        &self,
        recipient: i64,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), SendError> {
        self.record(
            recipient,
            Outgoing::Broadcast {
                recipient,
                text: text.to_string(),
                format,
            },
        )
    }
}

#[async_trait]
impl ChatApi for RecordingApi {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        _format: MessageFormat,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), SendError> {
        self.record(
            chat_id,
            Outgoing::Text {
                chat_id,
                text: text.to_string(),
                markup: markup.cloned(),
            },
        )
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        _format: MessageFormat,
        _markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), SendError> {
        self.record(
            chat_id,
            Outgoing::Edit {
                chat_id,
                message_id,
                text: text.to_string(),
            },
        )
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        _text: Option<&str>,
    ) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(Outgoing::Answer {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }

    async fn send_sticker(&self, chat_id: i64, file_id: &str) -> Result<(), SendError> {
        self.record(
            chat_id,
            Outgoing::Sticker {
                chat_id,
                file_id: file_id.to_string(),
            },
        )
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        _caption: &str,
        _format: MessageFormat,
    ) -> Result<(), SendError> {
        self.record(
            chat_id,
            Outgoing::Photo {
                chat_id,
                file_id: file_id.to_string(),
            },
        )
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        _caption: &str,
    ) -> Result<(), SendError> {
        self.record(
            chat_id,
            Outgoing::Document {
                chat_id,
                path: path.to_path_buf(),
            },
        )
    }

    async fn latest_profile_photo(&self, _user_id: i64) -> Result<Option<String>, SendError> {
        Ok(self.profile_photo.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub bot: Bot<RecordingApi>,
    pub api: Arc<RecordingApi>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub const OWNER: i64 = 1;
    pub const ADMIN: i64 = 2;

    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backup_dir = dir.path().join("backups");
        let config = Config::from_lookup(|key| match key {
            "HERALD_BOT_TOKEN" => Some("123:test".into()),
            "HERALD_OWNER_ID" => Some(Self::OWNER.to_string()),
            "HERALD_ADMIN_IDS" => Some(Self::ADMIN.to_string()),
            "HERALD_BACKUP_DIR" => Some(backup_dir.to_string_lossy().into_owned()),
            "HERALD_MAX_BACKUPS" => Some("3".into()),
            _ => None,
        })
        .unwrap();

        let api = Arc::new(RecordingApi::default());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = BroadcastDispatcher::new(BroadcastConfig {
            batch_size: 2,
            inter_batch_delay: Duration::ZERO,
            send_timeout: Duration::from_secs(1),
        });
        let bot = Bot::new(Arc::clone(&api), db, &config, dispatcher, "Herald".into());

        Self { bot, api, dir }
    }

    /// Register users as if each had sent /start privately.
    pub fn seed_users(&self, ids: &[i64]) {
        for &id in ids {
            self.bot.db.upsert_user(&(&user(id)).into()).unwrap();
        }
    }
}

pub fn user(id: i64) -> User {
    User {
        id,
        is_bot: false,
        first_name: format!("User{}", id),
        last_name: None,
        username: Some(format!("user{}", id)),
        language_code: Some("en".into()),
    }
}

fn message(from: i64, chat_id: i64) -> Message {
    let kind = if chat_id == from {
        ChatKind::Private
    } else {
        ChatKind::Group
    };
    Message {
        message_id: 10,
        from: Some(user(from)),
        chat: Chat { id: chat_id, kind },
        date: 0,
        text: None,
        sticker: None,
    }
}

pub fn text_update(from: i64, chat_id: i64, text: &str) -> Update {
    let mut msg = message(from, chat_id);
    msg.text = Some(text.to_string());
    Update {
        update_id: 1,
        message: Some(msg),
        callback_query: None,
    }
}

pub fn sticker_update(from: i64, file_id: &str, is_animated: bool, is_video: bool) -> Update {
    let mut msg = message(from, from);
    msg.sticker = Some(Sticker {
        file_id: file_id.to_string(),
        emoji: Some("🔥".into()),
        file_size: Some(2048),
        is_animated,
        is_video,
    });
    Update {
        update_id: 2,
        message: Some(msg),
        callback_query: None,
    }
}

/// A button press on a bot message in the presser's private chat.
pub fn callback_update(from: i64, data: &str) -> Update {
    Update {
        update_id: 3,
        message: None,
        callback_query: Some(CallbackQuery {
            id: format!("cb-{}", from),
            from: user(from),
            message: Some(message(from, from)),
            data: Some(data.to_string()),
        }),
    }
}
