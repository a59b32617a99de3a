use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use herald_db::Database;
use herald_gateway::{BroadcastDispatcher, ChatApi};
use herald_types::models::{MessageFormat, UserProfile};
use herald_types::telegram::{InlineKeyboardMarkup, Message, Update, User};
use tracing::{debug, error, warn};

use crate::admin::AdminGate;
use crate::config::Config;
use crate::error::BotError;
use crate::pending::PendingBroadcasts;
use crate::templates;

/// Shared handler state. One instance per process, behind an `Arc`; every
/// update is handled on its own task.
pub struct Bot<A> {
    pub(crate) api: Arc<A>,
    pub(crate) db: Arc<Database>,
    pub(crate) gate: AdminGate,
    pub(crate) dispatcher: BroadcastDispatcher,
    pub(crate) pending: PendingBroadcasts,
    pub(crate) owner_id: i64,
    pub(crate) backup_dir: PathBuf,
    pub(crate) max_backups: usize,
    pub(crate) bot_name: String,
    pub(crate) started_at: Instant,
}

/// `/name@bot rest` split into the lowercase command name and the raw rest.
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let body = text.strip_prefix('/')?;
    let (head, rest) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], body[idx..].trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), rest))
}

impl<A: ChatApi + 'static> Bot<A> {
    pub fn new(
        api: Arc<A>,
        db: Arc<Database>,
        config: &Config,
        dispatcher: BroadcastDispatcher,
        bot_name: String,
    ) -> Self {
        Self {
            api,
            db,
            gate: AdminGate::new(config.owner_id, config.admin_ids.iter().copied()),
            dispatcher,
            pending: PendingBroadcasts::default(),
            owner_id: config.owner_id,
            backup_dir: config.backup_dir.clone(),
            max_backups: config.max_backups,
            bot_name,
            started_at: Instant::now(),
        }
    }

    /// Handle one update. Failures are logged and reported to the owner.
    pub async fn process(&self, update: Update) {
        let update_id = update.update_id;
        if let Err(e) = self.handle_update(update).await {
            error!("Update {} failed: {}", update_id, e);
            let report = format!("⚠️ Bot Error:\n\n{}", e);
            if let Err(e) = self
                .api
                .send_text(self.owner_id, &report, MessageFormat::Plain, None)
                .await
            {
                warn!("Could not report error to owner: {}", e);
            }
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<(), BotError> {
        if let Some(query) = update.callback_query {
            // Buttons only exist on messages the bot sent, so the presser is
            // almost always known already.
            let user_id = query.from.id;
            if !self.db(move |db| db.touch(user_id)).await? {
                self.record_contact(&query.from).await?;
            }
            return self.handle_callback(query).await;
        }

        let Some(message) = update.message else {
            debug!("Ignoring update {} with no message", update.update_id);
            return Ok(());
        };
        let Some(from) = message.from.clone() else {
            return Ok(());
        };

        self.record_contact(&from).await?;

        if let Some(sticker) = &message.sticker {
            return self.handle_sticker(&message, &from, sticker).await;
        }

        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let Some((command, args)) = parse_command(text) else {
            return Ok(());
        };
        debug!(user = from.id, command = %command, "Command received");

        match command.as_str() {
            "start" => self.start(&message, &from, args).await,
            "help" => self.help(message.chat.id).await,
            "profile" => self.profile(message.chat.id, &from).await,
            "id" => self.reply(message.chat.id, &templates::your_id(from.id)).await,
            "mystickers" => self.my_stickers(message.chat.id, from.id).await,
            "ban" => self.ban(message.chat.id, from.id, args).await,
            "unban" => self.unban(message.chat.id, from.id, args).await,
            "broadcast" => {
                self.broadcast(message.chat.id, from.id, args, MessageFormat::Plain)
                    .await
            }
            "broadcast_html" => {
                self.broadcast(message.chat.id, from.id, args, MessageFormat::Html)
                    .await
            }
            "users" => self.users(message.chat.id, from.id).await,
            "userinfo" => self.user_info(message.chat.id, from.id, args).await,
            "banned" => self.banned(message.chat.id, from.id).await,
            "backup" => self.backup(message.chat.id, from.id).await,
            "logs" => self.logs(message.chat.id, from.id, args).await,
            _ => Ok(()),
        }
    }

    /// Create or refresh the sender's record.
    async fn record_contact(&self, user: &User) -> Result<(), BotError> {
        let profile = UserProfile::from(user);
        let created = self.db(move |db| db.upsert_user(&profile)).await?;
        if created {
            debug!(user = user.id, "New user recorded");
        }
        Ok(())
    }

    /// Run a store operation off the async runtime.
    pub(crate) async fn db<F, T>(&self, f: F) -> Result<T, BotError>
    where
        F: FnOnce(&Database) -> herald_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }

    /// Append to the activity log. A failed log write never fails the command.
    pub(crate) async fn log(&self, user_id: i64, action: &'static str, details: String) {
        if let Err(e) = self.db(move |db| db.add_log(user_id, action, &details)).await {
            warn!("Could not write activity log: {}", e);
        }
    }

    pub(crate) async fn reply(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        self.api
            .send_text(chat_id, text, MessageFormat::Html, None)
            .await?;
        Ok(())
    }

    /// Reply with text that may exceed one message, split across several.
    pub(crate) async fn reply_long(&self, chat_id: i64, text: &str) -> Result<(), BotError> {
        for chunk in templates::split_message(text, templates::MESSAGE_LIMIT) {
            self.reply(chat_id, &chunk).await?;
        }
        Ok(())
    }

    pub(crate) async fn reply_with(
        &self,
        chat_id: i64,
        text: &str,
        markup: &InlineKeyboardMarkup,
    ) -> Result<(), BotError> {
        self.api
            .send_text(chat_id, text, MessageFormat::Html, Some(markup))
            .await?;
        Ok(())
    }

    /// Edit the message a button was attached to, or send a fresh message
    /// when the platform did not include it.
    pub(crate) async fn edit_or_reply(
        &self,
        origin: Option<&Message>,
        fallback_chat: i64,
        text: &str,
    ) -> Result<(), BotError> {
        match origin {
            Some(message) => {
                self.api
                    .edit_text(message.chat.id, message.message_id, text, MessageFormat::Html, None)
                    .await?
            }
            None => {
                self.api
                    .send_text(fallback_chat, text, MessageFormat::Html, None)
                    .await?
            }
        }
        Ok(())
    }

    /// Admin check for commands. Tells the caller off when it fails.
    pub(crate) async fn require_admin(&self, chat_id: i64, user_id: i64) -> Result<bool, BotError> {
        if self.gate.is_authorized(user_id) {
            return Ok(true);
        }
        self.reply(chat_id, templates::NOT_AUTHORIZED).await?;
        Ok(false)
    }
}
