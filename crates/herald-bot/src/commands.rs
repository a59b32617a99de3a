//! Commands open to every user.

use chrono::Utc;
use herald_gateway::ChatApi;
use herald_types::models::{MessageFormat, StickerEntry, UserProfile};
use herald_types::telegram::{ChatKind, Message, Sticker, User};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::BotError;
use crate::router::Bot;
use crate::templates;

const PROFILE_UNAVAILABLE: &str =
    "❌ Could not fetch profile information. Please try again later.";

impl<A: ChatApi + 'static> Bot<A> {
    pub(crate) async fn start(
        &self,
        message: &Message,
        from: &User,
        args: &str,
    ) -> Result<(), BotError> {
        let chat_id = message.chat.id;
        if message.chat.kind != ChatKind::Private {
            return self.reply(chat_id, &templates::group_greeting(&from.first_name)).await;
        }

        if !args.is_empty() {
            let user_id = from.id;
            let payload = Value::String(args.to_string());
            self.db(move |db| db.set_extra(user_id, "start_param", payload)).await?;
        }

        let profile = UserProfile::from(from);
        self.reply_with(
            chat_id,
            &templates::welcome(&profile, &self.bot_name),
            &templates::welcome_keyboard(),
        )
        .await?;
        self.log(from.id, "start_command", "User started bot".into()).await;
        Ok(())
    }

    pub(crate) async fn help(&self, chat_id: i64) -> Result<(), BotError> {
        self.reply_with(chat_id, &templates::help(), &templates::help_keyboard(self.owner_id))
            .await
    }

    /// Profile card, sent as a photo caption when the user has a picture.
    pub(crate) async fn profile(&self, chat_id: i64, from: &User) -> Result<(), BotError> {
        let user_id = from.id;
        let record = match self.db(move |db| db.get_user(user_id)).await {
            Ok(record) => record,
            Err(e) => {
                warn!(user = user_id, "Profile lookup failed: {}", e);
                return self.reply(chat_id, PROFILE_UNAVAILABLE).await;
            }
        };
        let text = templates::profile(record.as_ref(), &UserProfile::from(from));

        let photo = match self.api.latest_profile_photo(user_id).await {
            Ok(photo) => photo,
            Err(e) => {
                warn!(user = user_id, "Could not fetch profile photos: {}", e);
                None
            }
        };

        match photo {
            Some(file_id) => {
                self.api
                    .send_photo(chat_id, &file_id, &text, MessageFormat::Html)
                    .await?
            }
            None => self.reply(chat_id, &text).await?,
        }
        Ok(())
    }

    pub(crate) async fn my_stickers(&self, chat_id: i64, user_id: i64) -> Result<(), BotError> {
        let record = self.db(move |db| db.get_user(user_id)).await?;
        let stickers = record.map(|r| r.stickers).unwrap_or_default();
        if stickers.is_empty() {
            return self.reply(chat_id, &templates::no_stickers()).await;
        }

        self.reply(chat_id, &templates::sticker_collection(&stickers)).await?;
        let start = stickers.len().saturating_sub(templates::RECENT_STICKERS);
        for sticker in &stickers[start..] {
            if let Err(e) = self.api.send_sticker(chat_id, &sticker.file_id).await {
                debug!(file_id = %sticker.file_id, "Could not resend sticker: {}", e);
            }
        }
        Ok(())
    }

    /// Save an incoming sticker to the sender's collection and react to it.
    pub(crate) async fn handle_sticker(
        &self,
        message: &Message,
        from: &User,
        sticker: &Sticker,
    ) -> Result<(), BotError> {
        let entry = StickerEntry {
            file_id: sticker.file_id.clone(),
            emoji: sticker.emoji.clone(),
            file_size: sticker.file_size,
            is_animated: sticker.is_animated,
            is_video: sticker.is_video,
            saved_at: Utc::now(),
        };

        let user_id = from.id;
        let stored = entry.clone();
        let saved = self.db(move |db| db.add_sticker(user_id, &stored)).await?;
        if !saved {
            debug!(user = user_id, "Sticker from unrecorded user not saved");
        }

        self.reply(message.chat.id, templates::sticker_reaction(&entry)).await?;
        let emoji = entry.emoji.as_deref().unwrap_or("none");
        self.log(user_id, "sticker_sent", format!("Sticker: {}", emoji)).await;
        Ok(())
    }
}
