//! Commands gated by [`AdminGate`](crate::admin::AdminGate). Each one checks
//! the caller first and replies with a refusal when the check fails.

use herald_gateway::ChatApi;
use herald_types::models::{BroadcastMessage, MessageFormat};
use tracing::{error, info, warn};

use crate::error::BotError;
use crate::router::Bot;
use crate::templates;

const BAN_USAGE: &str = "Usage: /ban &lt;user_id&gt; [reason]";
const UNBAN_USAGE: &str = "Usage: /unban &lt;user_id&gt;";
const BROADCAST_USAGE: &str =
    "Usage: /broadcast &lt;message&gt; or /broadcast_html &lt;html message&gt;";
const USERINFO_USAGE: &str = "Usage: /userinfo &lt;user_id&gt;";
const DEFAULT_BAN_REASON: &str = "No reason provided";
const DEFAULT_LOG_COUNT: u32 = 20;
const MAX_LOG_COUNT: u32 = 100;

/// First whitespace-separated word as a user id, plus whatever follows.
fn target_and_rest(args: &str) -> Option<Result<(i64, &str), ()>> {
    let mut parts = args.splitn(2, char::is_whitespace);
    let raw = parts.next().filter(|p| !p.is_empty())?;
    let rest = parts.next().unwrap_or("").trim();
    Some(raw.parse().map(|id| (id, rest)).map_err(|_| ()))
}

impl<A: ChatApi + 'static> Bot<A> {
    pub(crate) async fn ban(
        &self,
        chat_id: i64,
        admin_id: i64,
        args: &str,
    ) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        let (target, reason) = match target_and_rest(args) {
            None => return self.reply(chat_id, BAN_USAGE).await,
            Some(Err(())) => return self.reply(chat_id, templates::INVALID_USER_ID).await,
            Some(Ok((target, rest))) => {
                let reason = if rest.is_empty() { DEFAULT_BAN_REASON } else { rest };
                (target, reason.to_string())
            }
        };

        let stored = reason.clone();
        self.db(move |db| db.set_banned(target, &stored, admin_id)).await?;
        info!(user = target, admin = admin_id, "User banned");

        let notice = templates::ban_notice(&reason, admin_id, self.owner_id);
        if let Err(e) = self
            .api
            .send_text(target, &notice, MessageFormat::Html, None)
            .await
        {
            warn!(user = target, "Could not notify banned user: {}", e);
        }

        self.reply(chat_id, &templates::banned_confirmation(target, &reason)).await?;
        self.log(admin_id, "ban_user", format!("Banned {}: {}", target, reason)).await;
        Ok(())
    }

    pub(crate) async fn unban(
        &self,
        chat_id: i64,
        admin_id: i64,
        args: &str,
    ) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        let target = match target_and_rest(args) {
            None => return self.reply(chat_id, UNBAN_USAGE).await,
            Some(Err(())) => return self.reply(chat_id, templates::INVALID_USER_ID).await,
            Some(Ok((target, _))) => target,
        };

        let was_banned = self.db(move |db| db.clear_banned(target)).await?;
        if was_banned {
            info!(user = target, admin = admin_id, "User unbanned");
            let notice = templates::unban_notice(admin_id);
            if let Err(e) = self
                .api
                .send_text(target, &notice, MessageFormat::Html, None)
                .await
            {
                warn!(user = target, "Could not notify unbanned user: {}", e);
            }
        }

        self.reply(chat_id, &templates::unbanned_confirmation(target, was_banned))
            .await?;
        self.log(admin_id, "unban_user", format!("Unbanned {}", target)).await;
        Ok(())
    }

    /// Park the message and ask for confirmation. Delivery starts from the
    /// Confirm button callback. `/broadcast_html` sends the text as HTML
    /// markup; plain `/broadcast` delivers it verbatim.
    pub(crate) async fn broadcast(
        &self,
        chat_id: i64,
        admin_id: i64,
        args: &str,
        format: MessageFormat,
    ) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        if args.is_empty() {
            return self.reply(chat_id, BROADCAST_USAGE).await;
        }

        let message = BroadcastMessage::new(args, format);
        let token = self.pending.insert(admin_id, message);
        self.reply_with(
            chat_id,
            &templates::broadcast_confirmation(args),
            &templates::broadcast_keyboard(token),
        )
        .await
    }

    pub(crate) async fn users(&self, chat_id: i64, admin_id: i64) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        let stats = self.db(|db| db.stats()).await?;
        self.reply(chat_id, &templates::stats(&stats, self.started_at.elapsed()))
            .await
    }

    pub(crate) async fn user_info(
        &self,
        chat_id: i64,
        admin_id: i64,
        args: &str,
    ) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        let target = match target_and_rest(args) {
            None => return self.reply(chat_id, USERINFO_USAGE).await,
            Some(Err(())) => return self.reply(chat_id, templates::INVALID_USER_ID).await,
            Some(Ok((target, _))) => target,
        };

        match self.db(move |db| db.get_user(target)).await? {
            Some(record) => self.reply(chat_id, &templates::user_details(&record)).await,
            None => self.reply(chat_id, "❌ User not found in database!").await,
        }
    }

    pub(crate) async fn banned(&self, chat_id: i64, admin_id: i64) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        let records = self.db(|db| db.banned_users()).await?;
        self.reply_long(chat_id, &templates::banned_list(&records)).await
    }

    pub(crate) async fn backup(&self, chat_id: i64, admin_id: i64) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }

        let dir = self.backup_dir.clone();
        let keep = self.max_backups;
        let path = match self.db(move |db| db.backup(&dir, keep)).await {
            Ok(path) => path,
            Err(e) => {
                error!("Backup failed: {}", e);
                return self.reply(chat_id, "❌ Failed to create backup!").await;
            }
        };

        self.api
            .send_document(chat_id, &path, "📦 Database Backup")
            .await?;
        self.log(admin_id, "backup", path.display().to_string()).await;
        Ok(())
    }

    pub(crate) async fn logs(
        &self,
        chat_id: i64,
        admin_id: i64,
        args: &str,
    ) -> Result<(), BotError> {
        if !self.require_admin(chat_id, admin_id).await? {
            return Ok(());
        }
        let count = match args.split_whitespace().next() {
            None => DEFAULT_LOG_COUNT,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) => n.clamp(1, MAX_LOG_COUNT),
                Err(_) => return self.reply(chat_id, "Usage: /logs [count]").await,
            },
        };

        let entries = self.db(move |db| db.recent_logs(count)).await?;
        self.reply_long(chat_id, &templates::logs(&entries)).await
    }
}
