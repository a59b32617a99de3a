//! Reply texts and keyboards. Everything here renders HTML, so any value
//! that came from a user goes through [`escape_html`].

use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_gateway::Tally;
use herald_types::models::{LogEntry, StickerEntry, UserProfile, UserRecord, UserStats};
use herald_types::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const NOT_AUTHORIZED: &str = "❌ You are not authorized to use this command!";
pub const INVALID_USER_ID: &str = "❌ Invalid user ID!";
pub const ACCESS_DENIED: &str = "❌ Access denied!";

/// Stickers re-sent by /mystickers.
pub const RECENT_STICKERS: usize = 5;

/// Longest text the platform accepts in one message, in UTF-16 code units.
pub const MESSAGE_LIMIT: usize = 4096;

/// Free text quoted inside a list line is cut to this many characters.
const QUOTE_LIMIT: usize = 200;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn clip(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &raw[..idx]),
        None => raw.to_string(),
    }
}

fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Break `text` into messages of at most `limit` UTF-16 units. Cuts fall on
/// line breaks so HTML tags, which never span lines here, stay balanced; a
/// single line longer than `limit` is cut between characters.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    fn flush(chunks: &mut Vec<String>, current: &mut String, len: &mut usize) {
        let chunk = std::mem::take(current);
        if !chunk.trim().is_empty() {
            chunks.push(chunk.trim_end().to_string());
        }
        *len = 0;
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = utf16_len(line);
        if len + line_len > limit {
            flush(&mut chunks, &mut current, &mut len);
        }
        if line_len <= limit {
            current.push_str(line);
            len += line_len;
            continue;
        }
        for c in line.chars() {
            if len + c.len_utf16() > limit {
                flush(&mut chunks, &mut current, &mut len);
            }
            current.push(c);
            len += c.len_utf16();
        }
    }
    flush(&mut chunks, &mut current, &mut len);
    chunks
}

fn date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn handle(username: Option<&str>) -> String {
    match username {
        Some(name) => format!("@{}", escape_html(name)),
        None => "Not set".into(),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "✅ Yes" } else { "❌ No" }
}

pub fn welcome(user: &UserProfile, bot_name: &str) -> String {
    format!(
        "🎉 Welcome <b>{name}</b>! 🎉\n\n\
         🤖 I'm <b>{bot}</b>\n\n\
         📌 <b>Your Info:</b>\n\
         ├ Username: {handle}\n\
         ├ ID: <code>{id}</code>\n\
         └ Type: {kind}\n\n\
         🌟 <b>Features:</b>\n\
         • Sticker Collection\n\
         • User Management\n\
         • Advanced Admin Controls\n\n\
         Type /help to see all commands!",
        name = escape_html(&user.first_name),
        bot = escape_html(bot_name),
        handle = handle(user.username.as_deref()),
        id = user.id,
        kind = if user.is_bot { "Bot" } else { "Human" },
    )
}

pub fn welcome_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📊 Stats", "stats"),
            InlineKeyboardButton::callback("👤 Profile", "profile"),
        ],
        vec![InlineKeyboardButton::callback("🛠 Admin Panel", "admin_panel")],
        vec![InlineKeyboardButton::callback("ℹ️ Help", "help")],
    ])
}

pub fn group_greeting(first_name: &str) -> String {
    format!(
        "👋 Hello {}! I'm alive and working in this group!",
        escape_html(first_name)
    )
}

pub fn help() -> String {
    "🤖 <b>Bot Commands Menu</b> 🤖\n\n\
     <b>User Commands:</b>\n\
     /start - Start the bot\n\
     /profile - View your profile\n\
     /id - Get your user ID\n\
     /mystickers - Your saved stickers\n\
     /help - Show this help message\n\n\
     <b>Admin Commands:</b>\n\
     /ban &lt;user_id&gt; [reason] - Ban a user\n\
     /unban &lt;user_id&gt; - Unban a user\n\
     /broadcast &lt;message&gt; - Broadcast to all users\n\
     /broadcast_html &lt;message&gt; - Broadcast with HTML formatting\n\
     /users - User statistics\n\
     /banned - List banned users\n\
     /backup - Get a database backup\n\
     /userinfo &lt;user_id&gt; - User details\n\
     /logs [count] - Recent activity\n\n\
     <b>Stickers:</b>\n\
     Send any sticker and I'll save it to your collection."
        .to_string()
}

pub fn help_keyboard(owner_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::url(
            "📞 Contact Admin",
            format!("tg://user?id={}", owner_id),
        )],
        vec![InlineKeyboardButton::callback("⚙️ Admin Panel", "admin_panel")],
    ])
}

pub fn admin_panel() -> String {
    "🛠 <b>Admin Panel</b>\n\n\
     /ban - Ban a user\n\
     /unban - Unban a user\n\
     /broadcast - Send message to all users\n\
     /broadcast_html - Send HTML-formatted message\n\
     /users - View statistics\n\
     /banned - List banned users\n\
     /backup - Get database backup\n\
     /userinfo - Get user details\n\
     /logs - Recent activity"
        .to_string()
}

/// Short profile. Falls back to the live platform profile when the user has
/// no record yet.
pub fn profile(record: Option<&UserRecord>, live: &UserProfile) -> String {
    let profile = record.map(|r| &r.profile).unwrap_or(live);
    let mut out = format!(
        "👤 <b>User Profile</b>\n\n\
         <b>Name:</b> {}\n\
         <b>Username:</b> {}\n\
         <b>ID:</b> <code>{}</code>\n",
        escape_html(&profile.full_name()),
        handle(profile.username.as_deref()),
        profile.id,
    );
    match record {
        Some(r) => {
            let _ = write!(
                out,
                "<b>Join Date:</b> {}\n<b>Saved Stickers:</b> {}",
                date(r.joined_at),
                r.stickers.len()
            );
        }
        None => {
            let _ = write!(
                out,
                "<b>Language:</b> {}",
                escape_html(profile.language_code.as_deref().unwrap_or("Unknown"))
            );
        }
    }
    out
}

pub fn user_details(record: &UserRecord) -> String {
    let p = &record.profile;
    let (reason, by, at) = match &record.ban {
        Some(ban) => (
            escape_html(&ban.reason),
            format!("<code>{}</code>", ban.banned_by),
            date(ban.banned_at),
        ),
        None => ("N/A".into(), "N/A".into(), "N/A".into()),
    };

    format!(
        "👤 <b>Detailed User Information</b>\n\n\
         <b>Basic Info:</b>\n\
         ├ ID: <code>{id}</code>\n\
         ├ Username: {handle}\n\
         ├ Name: {name}\n\
         ├ Bot: {bot}\n\
         ├ Language: {lang}\n\
         └ Join Date: {joined}\n\n\
         <b>Status:</b>\n\
         ├ Banned: {banned}\n\
         ├ Ban Reason: {reason}\n\
         ├ Banned By: {by}\n\
         └ Ban Date: {at}\n\n\
         <b>Statistics:</b>\n\
         ├ Saved Stickers: {stickers}\n\
         └ Last Seen: {seen}",
        id = record.id,
        handle = handle(p.username.as_deref()),
        name = escape_html(&p.full_name()),
        bot = yes_no(p.is_bot),
        lang = escape_html(p.language_code.as_deref().unwrap_or("N/A")),
        joined = date(record.joined_at),
        banned = yes_no(record.is_banned),
        reason = reason,
        by = by,
        at = at,
        stickers = record.stickers.len(),
        seen = date(record.last_seen),
    )
}

pub fn my_stats(user_id: i64, record: Option<&UserRecord>) -> String {
    let (joined, stickers) = match record {
        Some(r) => (date(r.joined_at), r.stickers.len()),
        None => ("Unknown".into(), 0),
    };
    format!(
        "📊 <b>Your Statistics</b>\n\n\
         User ID: <code>{}</code>\n\
         Join Date: {}\n\
         Saved Stickers: {}",
        user_id, joined, stickers
    )
}

pub fn your_id(user_id: i64) -> String {
    format!("Your ID: <code>{}</code>", user_id)
}

pub fn ban_notice(reason: &str, admin_id: i64, owner_id: i64) -> String {
    format!(
        "🚫 <b>You have been banned!</b>\n\n\
         ❌ <b>Reason:</b> {}\n\
         👮 <b>Admin ID:</b> <code>{}</code>\n\n\
         If you think this is a mistake, contact: tg://user?id={}",
        escape_html(reason),
        admin_id,
        owner_id
    )
}

pub fn unban_notice(admin_id: i64) -> String {
    format!(
        "✅ <b>You have been unbanned!</b>\n\n\
         You can now use the bot again.\n\n\
         👮 <b>Admin ID:</b> <code>{}</code>",
        admin_id
    )
}

pub fn banned_confirmation(user_id: i64, reason: &str) -> String {
    format!(
        "✅ User <code>{}</code> has been banned.\nReason: {}",
        user_id,
        escape_html(reason)
    )
}

pub fn unbanned_confirmation(user_id: i64, was_banned: bool) -> String {
    if was_banned {
        format!("✅ User <code>{}</code> has been unbanned.", user_id)
    } else {
        format!("ℹ️ User <code>{}</code> was not banned.", user_id)
    }
}

pub fn banned_list(records: &[UserRecord]) -> String {
    if records.is_empty() {
        return "✅ No users are currently banned.".into();
    }
    let mut out = String::from("🚫 <b>Banned Users</b>\n\n");
    for record in records {
        let reason = record.ban.as_ref().map(|b| b.reason.as_str()).unwrap_or("");
        let _ = write!(
            out,
            "• ID: <code>{}</code>\nReason: {}\n\n",
            record.id,
            escape_html(&clip(reason, QUOTE_LIMIT))
        );
    }
    out
}

pub fn stats(stats: &UserStats, uptime: Duration) -> String {
    let last_backup = stats.last_backup.map(date).unwrap_or_else(|| "Never".into());
    format!(
        "📊 <b>Bot Statistics</b>\n\n\
         👥 Total Users: {}\n\
         📈 Today's New Users: {}\n\
         🚫 Banned Users: {}\n\
         📅 Bot Uptime: {}\n\
         🔄 Last Backup: {}",
        stats.total,
        stats.joined_today,
        stats.banned,
        format_uptime(uptime),
        last_backup
    )
}

pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let (hours, minutes, seconds) = (rest / 3600, rest % 3600 / 60, rest % 60);
    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

pub fn sticker_collection(stickers: &[StickerEntry]) -> String {
    let animated = stickers.iter().filter(|s| s.is_animated).count();
    let video = stickers.iter().filter(|s| s.is_video).count();
    format!(
        "📊 <b>Your Sticker Collection</b>\n\n\
         Total Stickers: {}\n\
         ✨ Animated: {}\n\
         🎥 Video: {}\n\n\
         Send any sticker to add it to your collection!",
        stickers.len(),
        animated,
        video
    )
}

pub fn no_stickers() -> String {
    "📭 You haven't saved any stickers yet!\n\nSend me a sticker and I'll save it for you! 😊".into()
}

pub fn sticker_reaction(sticker: &StickerEntry) -> &'static str {
    if sticker.is_animated {
        "✨ Cool animated sticker!"
    } else if sticker.is_video {
        "🎥 Nice video sticker!"
    } else {
        "👍 Nice sticker!"
    }
}

pub fn broadcast_confirmation(text: &str) -> String {
    format!(
        "⚠️ <b>Broadcast Confirmation</b>\n\nMessage:\n{}\n\nSend to all users?",
        escape_html(text)
    )
}

pub fn broadcast_keyboard(token: u32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Confirm", format!("bc:confirm:{}", token)),
        InlineKeyboardButton::callback("❌ Cancel", format!("bc:cancel:{}", token)),
    ]])
}

pub fn broadcast_report(tally: &Tally) -> String {
    let mut out = format!(
        "✅ Broadcast completed!\n\nSuccess: {}\nFailed: {}",
        tally.success, tally.failure
    );
    if tally.cancelled {
        out.push_str(
            "\n\n⚠️ Stopped early by shutdown; unsent recipients are counted as failed.",
        );
    }
    out
}

pub fn logs(entries: &[LogEntry]) -> String {
    if entries.is_empty() {
        return "📭 No activity logged yet.".into();
    }
    let mut out = String::from("📜 <b>Recent Activity</b>\n\n");
    for entry in entries {
        let _ = writeln!(
            out,
            "{} · <code>{}</code> · {} · {}",
            entry.created_at.format("%m-%d %H:%M"),
            entry.user_id,
            escape_html(&entry.action),
            escape_html(&clip(&entry.details, QUOTE_LIMIT))
        );
    }
    out
}
