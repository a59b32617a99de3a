//! Inline button presses.

use std::sync::Arc;

use herald_gateway::{BroadcastError, ChatApi, SendCapability};
use herald_types::telegram::{CallbackQuery, Message};
use tracing::{debug, error, info, warn};

use crate::error::BotError;
use crate::router::Bot;
use crate::templates;

const BROADCAST_EXPIRED: &str = "This broadcast has expired or was already handled.";
const BROADCAST_BUSY: &str =
    "Another broadcast is already running. Try again when it has finished.";
const BROADCAST_SETUP_FAILED: &str = "❌ Broadcast setup failed. No messages were sent.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Stats,
    Profile,
    AdminPanel,
    Help,
    ConfirmBroadcast(u32),
    CancelBroadcast(u32),
}

fn parse_action(data: &str) -> Option<Action> {
    match data {
        "stats" => return Some(Action::Stats),
        "profile" => return Some(Action::Profile),
        "admin_panel" => return Some(Action::AdminPanel),
        "help" => return Some(Action::Help),
        _ => {}
    }
    let rest = data.strip_prefix("bc:")?;
    let (verb, token) = rest.split_once(':')?;
    let token = token.parse().ok()?;
    match verb {
        "confirm" => Some(Action::ConfirmBroadcast(token)),
        "cancel" => Some(Action::CancelBroadcast(token)),
        _ => None,
    }
}

impl<A: ChatApi + 'static> Bot<A> {
    pub(crate) async fn handle_callback(&self, query: CallbackQuery) -> Result<(), BotError> {
        // The client shows a spinner until the query is answered.
        if let Err(e) = self.api.answer_callback(&query.id, None).await {
            warn!("Could not answer callback {}: {}", query.id, e);
        }

        let user_id = query.from.id;
        let origin = query.message.as_ref();
        let chat_id = origin.map(|m| m.chat.id).unwrap_or(user_id);

        let Some(action) = query.data.as_deref().and_then(parse_action) else {
            debug!(user = user_id, data = ?query.data, "Unknown callback data");
            return Ok(());
        };

        match action {
            Action::Stats => {
                let record = self.db(move |db| db.get_user(user_id)).await?;
                self.edit_or_reply(origin, chat_id, &templates::my_stats(user_id, record.as_ref()))
                    .await
            }
            Action::Profile => self.profile(chat_id, &query.from).await,
            Action::Help => self.help(chat_id).await,
            Action::AdminPanel => {
                let text = if self.gate.is_authorized(user_id) {
                    templates::admin_panel()
                } else {
                    templates::ACCESS_DENIED.to_string()
                };
                self.edit_or_reply(origin, chat_id, &text).await
            }
            Action::ConfirmBroadcast(token) => {
                self.confirm_broadcast(origin, chat_id, user_id, token).await
            }
            Action::CancelBroadcast(token) => {
                let text = match self.pending.take(token, user_id) {
                    Some(_) => "❌ Broadcast cancelled.",
                    None => BROADCAST_EXPIRED,
                };
                self.edit_or_reply(origin, chat_id, text).await
            }
        }
    }

    async fn confirm_broadcast(
        &self,
        origin: Option<&Message>,
        chat_id: i64,
        admin_id: i64,
        token: u32,
    ) -> Result<(), BotError> {
        if !self.gate.is_authorized(admin_id) {
            return self.edit_or_reply(origin, chat_id, templates::ACCESS_DENIED).await;
        }
        let Some(pending) = self.pending.take(token, admin_id) else {
            return self.edit_or_reply(origin, chat_id, BROADCAST_EXPIRED).await;
        };

        let job = match self.dispatcher.begin() {
            Ok(job) => job,
            Err(BroadcastError::Busy) => {
                return self.edit_or_reply(origin, chat_id, BROADCAST_BUSY).await;
            }
        };

        self.edit_or_reply(origin, chat_id, "📢 Broadcasting message to all users...")
            .await?;

        let recipients = match self.db(|db| db.snapshot(false)).await {
            Ok(records) => records.into_iter().map(|r| r.id).collect::<Vec<_>>(),
            Err(e) => {
                error!(admin = admin_id, "Broadcast aborted, could not read recipients: {}", e);
                return self.edit_or_reply(origin, chat_id, BROADCAST_SETUP_FAILED).await;
            }
        };

        let send: Arc<dyn SendCapability> = self.api.clone();
        info!(admin = admin_id, recipients = recipients.len(), "Broadcast confirmed");
        let tally = job.run(&pending.message, &recipients, send).await;

        self.edit_or_reply(origin, chat_id, &templates::broadcast_report(&tally))
            .await?;
        self.log(
            admin_id,
            "broadcast",
            format!(
                "Sent to {} users, failed: {}",
                tally.success, tally.failure
            ),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, Outgoing, callback_update, text_update};
    use herald_types::models::MessageFormat;

    /// Run `/broadcast` as `admin` and return the token from the Confirm button.
    async fn stage(h: &Harness, admin: i64, text: &str) -> u32 {
        stage_command(h, admin, &format!("/broadcast {}", text)).await
    }

    async fn stage_command(h: &Harness, admin: i64, command: &str) -> u32 {
        h.bot
            .handle_update(text_update(admin, admin, command))
            .await
            .unwrap();
        let markup = h
            .api
            .all()
            .into_iter()
            .rev()
            .find_map(|o| match o {
                Outgoing::Text { markup: Some(m), .. } => Some(m),
                _ => None,
            })
            .unwrap();
        let data = markup.inline_keyboard[0][0].callback_data.clone().unwrap();
        match parse_action(&data) {
            Some(Action::ConfirmBroadcast(token)) => token,
            other => panic!("unexpected button data {:?}", other),
        }
    }

    #[test]
    fn callback_data_parsing() {
        assert_eq!(parse_action("stats"), Some(Action::Stats));
        assert_eq!(parse_action("bc:confirm:17"), Some(Action::ConfirmBroadcast(17)));
        assert_eq!(parse_action("bc:cancel:4294967295"), Some(Action::CancelBroadcast(u32::MAX)));
        assert_eq!(parse_action("bc:confirm:"), None);
        assert_eq!(parse_action("bc:launch:1"), None);
        assert_eq!(parse_action("something"), None);
    }

    #[tokio::test]
    async fn confirmed_broadcast_reaches_unbanned_users() {
        let h = Harness::new();
        h.seed_users(&[10, 11, 12, 13, 14]);
        h.bot.db.set_banned(12, "spam", Harness::OWNER).unwrap();
        h.api.fail_chat(14);

        let token = stage(&h, Harness::ADMIN, "hello everyone").await;
        assert!(h.api.broadcast_recipients().is_empty());

        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:confirm:{}", token)))
            .await
            .unwrap();

        // The admin's own record is part of the audience.
        assert_eq!(h.api.broadcast_recipients(), vec![Harness::ADMIN, 10, 11, 13]);
        let edits = h.api.edits();
        assert_eq!(edits[0], "📢 Broadcasting message to all users...");
        assert_eq!(
            edits.last().unwrap(),
            "✅ Broadcast completed!\n\nSuccess: 4\nFailed: 1"
        );
        assert!(h.bot.pending.is_empty());

        let logs = h.bot.db.recent_logs(1).unwrap();
        assert_eq!(logs[0].action, "broadcast");
    }

    #[tokio::test]
    async fn html_variant_keeps_markup_for_delivery() {
        let h = Harness::new();
        h.seed_users(&[10]);

        let plain = stage(&h, Harness::ADMIN, "<b>as typed</b>").await;
        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:confirm:{}", plain)))
            .await
            .unwrap();
        let html = stage_command(&h, Harness::ADMIN, "/broadcast_html <b>news</b>").await;
        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:confirm:{}", html)))
            .await
            .unwrap();

        let delivered: Vec<(String, MessageFormat)> = h
            .api
            .all()
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Broadcast { recipient: 10, text, format } => Some((text, format)),
                _ => None,
            })
            .collect();
        assert_eq!(
            delivered,
            vec![
                ("<b>as typed</b>".to_string(), MessageFormat::Plain),
                ("<b>news</b>".to_string(), MessageFormat::Html),
            ]
        );
    }

    #[tokio::test]
    async fn token_is_single_use_and_bound_to_its_author() {
        let h = Harness::new();
        h.seed_users(&[10]);
        let token = stage(&h, Harness::ADMIN, "hi").await;

        h.bot
            .handle_update(callback_update(Harness::OWNER, &format!("bc:confirm:{}", token)))
            .await
            .unwrap();
        assert_eq!(h.api.edits(), vec![BROADCAST_EXPIRED]);
        assert!(h.api.broadcast_recipients().is_empty());

        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:cancel:{}", token)))
            .await
            .unwrap();
        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:confirm:{}", token)))
            .await
            .unwrap();

        assert_eq!(
            h.api.edits(),
            vec![BROADCAST_EXPIRED, "❌ Broadcast cancelled.", BROADCAST_EXPIRED]
        );
        assert!(h.api.broadcast_recipients().is_empty());
    }

    #[tokio::test]
    async fn non_admin_cannot_confirm() {
        let h = Harness::new();
        h.bot
            .handle_update(callback_update(700, "bc:confirm:1"))
            .await
            .unwrap();
        assert_eq!(h.api.edits(), vec![templates::ACCESS_DENIED]);
    }

    #[tokio::test]
    async fn busy_dispatcher_rejects_second_job() {
        let h = Harness::new();
        h.seed_users(&[10]);
        let token = stage(&h, Harness::ADMIN, "hi").await;

        let _held = h.bot.dispatcher.begin().unwrap();
        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:confirm:{}", token)))
            .await
            .unwrap();

        assert_eq!(h.api.edits(), vec![BROADCAST_BUSY]);
        assert!(h.api.broadcast_recipients().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_aborts_before_any_send() {
        let h = Harness::new();
        h.seed_users(&[10, 11]);
        let token = stage(&h, Harness::ADMIN, "hi").await;

        h.bot
            .db
            .with_conn(|conn| {
                conn.execute("UPDATE users SET stickers = 'not json' WHERE id = 11", [])?;
                Ok(())
            })
            .unwrap();

        h.bot
            .handle_update(callback_update(Harness::ADMIN, &format!("bc:confirm:{}", token)))
            .await
            .unwrap();

        assert!(h.api.broadcast_recipients().is_empty());
        assert_eq!(h.api.edits().last().unwrap(), BROADCAST_SETUP_FAILED);
    }

    #[tokio::test]
    async fn admin_panel_button_is_gated() {
        let h = Harness::new();
        h.bot.handle_update(callback_update(700, "admin_panel")).await.unwrap();
        h.bot
            .handle_update(callback_update(Harness::OWNER, "admin_panel"))
            .await
            .unwrap();

        let edits = h.api.edits();
        assert_eq!(edits[0], templates::ACCESS_DENIED);
        assert!(edits[1].contains("Admin Panel"));
    }

    #[tokio::test]
    async fn stats_button_edits_in_place() {
        let h = Harness::new();
        h.bot.handle_update(callback_update(700, "stats")).await.unwrap();

        let edits = h.api.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].contains("<code>700</code>"));
        assert!(h.api.all().contains(&Outgoing::Answer {
            callback_id: "cb-700".into()
        }));
    }
}
