use std::path::Path;

use async_trait::async_trait;
use herald_types::models::MessageFormat;
use herald_types::telegram::InlineKeyboardMarkup;

use crate::send::{SendCapability, SendError};

/// Everything the command handlers need from the chat platform.
#[async_trait]
pub trait ChatApi: SendCapability {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: MessageFormat,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), SendError>;

    /// Replace the text of a message the bot sent earlier.
    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        format: MessageFormat,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), SendError>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), SendError>;

    async fn send_sticker(&self, chat_id: i64, file_id: &str) -> Result<(), SendError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
        format: MessageFormat,
    ) -> Result<(), SendError>;

    /// Upload a local file.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<(), SendError>;

    /// File id of the largest size of the user's newest profile photo.
    async fn latest_profile_photo(&self, user_id: i64) -> Result<Option<String>, SendError>;
}
