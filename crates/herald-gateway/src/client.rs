use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use herald_types::models::MessageFormat;
use herald_types::telegram::{
    ApiResponse, InlineKeyboardMarkup, ResponseParameters, Update, User, UserProfilePhotos,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::ChatApi;
use crate::send::{SendCapability, SendError};

const BASE_URL: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP call gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Thin Bot API client. One shared connection pool; safe to call
/// concurrently from broadcast tasks.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Serialize)]
struct SendSticker<'a> {
    chat_id: i64,
    sticker: &'a str,
}

#[derive(Serialize)]
struct SendPhoto<'a> {
    chat_id: i64,
    photo: &'a str,
    caption: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Serialize)]
struct GetUserProfilePhotos {
    user_id: i64,
    limit: u32,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_api_url(BASE_URL, token)
    }

    /// Point the client at a Bot API server other than the public one.
    pub fn with_api_url(api_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    pub async fn get_me(&self) -> Result<User, SendError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Long-poll for updates newer than `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, SendError> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message", "callback_query"],
        };
        let url = format!("{}/getUpdates", self.base);
        let resp = self
            .client
            .post(&url)
            .timeout(timeout + POLL_GRACE)
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, SendError> {
        let url = format!("{}/{}", self.base, method);
        let resp = self.client.post(&url).json(body).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, SendError> {
    let status = resp.status().as_u16();
    let envelope: ApiResponse<T> = resp
        .json()
        .await
        .map_err(|e| SendError::Decode(e.without_url().to_string()))?;
    into_result(status, envelope)
}

fn into_result<T>(status: u16, envelope: ApiResponse<T>) -> Result<T, SendError> {
    match envelope {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse {
            ok: true,
            result: None,
            ..
        } => Err(SendError::Decode("response without result".into())),
        ApiResponse {
            error_code,
            description,
            parameters,
            ..
        } => Err(classify(
            error_code.unwrap_or(status),
            description.unwrap_or_default(),
            parameters,
        )),
    }
}

/// Map a Bot API error onto the failure taxonomy.
pub fn classify(
    code: u16,
    description: String,
    parameters: Option<ResponseParameters>,
) -> SendError {
    match code {
        403 => SendError::Blocked,
        400 if description.to_lowercase().contains("chat not found") => SendError::ChatNotFound,
        429 => SendError::RateLimited {
            retry_after: parameters.and_then(|p| p.retry_after).unwrap_or(1),
        },
        _ => SendError::Api {
            status: code,
            description,
        },
    }
}

#[async_trait]
impl SendCapability for TelegramClient {
    async fn send(
        &self,
        recipient: i64,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), SendError> {
        self.send_text(recipient, text, format, None).await
    }
}

#[async_trait]
impl ChatApi for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: MessageFormat,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), SendError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: format.parse_mode(),
            reply_markup: markup,
        };
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        format: MessageFormat,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), SendError> {
        let body = EditMessageText {
            chat_id,
            message_id,
            text,
            parse_mode: format.parse_mode(),
            reply_markup: markup,
        };
        let _: serde_json::Value = self.call("editMessageText", &body).await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), SendError> {
        let body = AnswerCallbackQuery {
            callback_query_id: callback_id,
            text,
        };
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn send_sticker(&self, chat_id: i64, file_id: &str) -> Result<(), SendError> {
        let body = SendSticker {
            chat_id,
            sticker: file_id,
        };
        let _: serde_json::Value = self.call("sendSticker", &body).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        caption: &str,
        format: MessageFormat,
    ) -> Result<(), SendError> {
        let body = SendPhoto {
            chat_id,
            photo: file_id,
            caption,
            parse_mode: format.parse_mode(),
        };
        let _: serde_json::Value = self.call("sendPhoto", &body).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<(), SendError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SendError::Network(format!("reading {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        debug!(chat_id, file = %file_name, size = bytes.len(), "Uploading document");

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let url = format!("{}/sendDocument", self.base);
        let resp = self.client.post(&url).multipart(form).send().await?;
        let _: serde_json::Value = decode(resp).await?;
        Ok(())
    }

    async fn latest_profile_photo(&self, user_id: i64) -> Result<Option<String>, SendError> {
        let body = GetUserProfilePhotos { user_id, limit: 1 };
        let photos: UserProfilePhotos = self.call("getUserProfilePhotos", &body).await?;
        Ok(photos
            .photos
            .into_iter()
            .next()
            .and_then(|sizes| sizes.into_iter().max_by_key(|p| p.width * p.height))
            .map(|p| p.file_id))
    }
}
