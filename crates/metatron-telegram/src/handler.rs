// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message classification: who sent it, whether it is for us, and what
//! the chat prompt is.

use metatron_core::{Identity, ReplyTarget};
use metatron_jobs::render;
use teloxide::prelude::*;
use teloxide::types::{ChatKind, User};

pub const CHANNEL_NAME: &str = "telegram";

pub fn identity_of(user: &User) -> Identity {
    let display = user.mention().unwrap_or_else(|| user.full_name());
    Identity::native(user.id.0.to_string(), display)
}

pub fn reply_target(chat: ChatId) -> ReplyTarget {
    ReplyTarget::new(CHANNEL_NAME, chat.0.to_string())
}

/// A user's private chat shares the user's id.
pub fn private_target(user: &User) -> ReplyTarget {
    ReplyTarget::new(CHANNEL_NAME, user.id.0.to_string())
}

pub fn is_dm(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

/// Whether `user` may run admin commands.
///
/// Matches the user id or the username (with or without `@`). An empty
/// admin list admits nobody.
pub fn is_admin(user: &User, admins: &[String]) -> bool {
    let id = user.id.0.to_string();
    admins.iter().any(|allowed| {
        *allowed == id
            || user.username.as_deref().is_some_and(|name| {
                name.eq_ignore_ascii_case(allowed.strip_prefix('@').unwrap_or(allowed))
            })
    })
}

/// The chat prompt of a message addressed to the bot, if any.
///
/// DMs are always addressed. In groups the bot must be `@mentioned`;
/// replies to other messages are ignored. Mentions and `<...>` markup are
/// removed.
pub fn chat_prompt(msg: &Message, bot_username: &str) -> Option<String> {
    let text = msg.text()?;
    if text.trim_start().starts_with('/') {
        return None;
    }
    let mention = format!("@{bot_username}");
    let mentioned = contains_ignore_case(text, &mention);
    if !is_dm(msg) && (!mentioned || msg.reply_to_message().is_some()) {
        return None;
    }
    let prompt = render::strip_tags(&remove_ignore_case(text, &mention));
    let prompt = prompt.trim_end().to_string();
    (!prompt.is_empty()).then_some(prompt)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn remove_ignore_case(text: &str, needle: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    for (start, _) in lower.match_indices(&needle) {
        out.push_str(&text[rest..start]);
        rest = start + needle.len();
    }
    out.push_str(&text[rest..]);
    out
}
