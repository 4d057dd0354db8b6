// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inline keyboard encoding for result buttons.
//!
//! Callback data is `<prefix>:<token>` where the prefix names the action.
//! Telegram caps callback data at 64 bytes; tokens are 32 hex characters.

use metatron_core::{ActionKind, MessageAction};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

fn prefix(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Reroll => "r",
        ActionKind::Mail => "m",
        ActionKind::Delete => "d",
    }
}

fn emoji(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Reroll => "\u{1f3b2}",
        ActionKind::Mail => "\u{2709}",
        ActionKind::Delete => "\u{274c}",
    }
}

pub fn encode(action: &MessageAction) -> String {
    format!("{}:{}", prefix(action.kind), action.token)
}

/// Splits callback data back into an action kind and token.
pub fn decode(data: &str) -> Option<(ActionKind, String)> {
    let (prefix, token) = data.split_once(':')?;
    let kind = match prefix {
        "r" => ActionKind::Reroll,
        "m" => ActionKind::Mail,
        "d" => ActionKind::Delete,
        _ => return None,
    };
    if token.is_empty() {
        return None;
    }
    Some((kind, token.to_string()))
}

/// One row holding every action.
pub fn keyboard(actions: &[MessageAction]) -> Option<InlineKeyboardMarkup> {
    if actions.is_empty() {
        return None;
    }
    let row = actions
        .iter()
        .map(|action| {
            InlineKeyboardButton::callback(
                format!("{} {}", emoji(action.kind), action.kind.label()),
                encode(action),
            )
        })
        .collect::<Vec<_>>();
    Some(InlineKeyboardMarkup::new(vec![row]))
}
