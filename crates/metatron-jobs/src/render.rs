// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text rendering for results, acknowledgements, and error reports.

use std::time::Duration;

use metatron_core::{ImageFlavor, MetatronError};

/// Fixed segment size for long text replies.
pub const CHUNK_CHARS: usize = 2000;

pub const QUEUE_LIMIT_NOTICE: &str =
    "Queue limit reached, please wait until your current gen or gens finish";

pub const EXPIRED_ACTION_NOTICE: &str = "This result is too old to act on.";

const ATTACHMENT_STEM_CHARS: usize = 20;
const MAIL_STEM_CHARS: usize = 100;

/// Removes `<...>` markup such as mentions and trims leading whitespace.
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut pending = String::new();
    for c in text.chars() {
        match c {
            '<' => {
                depth += 1;
                pending.push(c);
            }
            '>' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    pending.clear();
                } else {
                    pending.push(c);
                }
            }
            _ if depth > 0 => pending.push(c),
            _ => out.push(c),
        }
    }
    // An unclosed `<` is kept as typed.
    out.push_str(&pending);
    out.trim_start().to_string()
}

/// Splits `text` into segments of at most `size` characters.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// File name stem for result attachments: the prompt's first 20 characters.
pub fn attachment_stem(prompt: &str) -> String {
    let stem: String = prompt
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .take(ATTACHMENT_STEM_CHARS)
        .collect();
    if stem.trim().is_empty() {
        "result".to_string()
    } else {
        stem
    }
}

/// File name stem for mailed copies: word characters only, up to 100.
pub fn mail_stem(prompt: &str) -> String {
    let stem: String = prompt
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '-' | '.'))
        .take(MAIL_STEM_CHARS)
        .collect();
    if stem.trim().is_empty() {
        "result".to_string()
    } else {
        stem
    }
}

pub fn queued_ack(display_name: &str, ahead: usize) -> String {
    format!("{display_name} being created: {ahead} requests in queue ahead of you.")
}

pub fn reroll_ack(ahead: usize) -> String {
    format!("Rerolling: {ahead} requests in queue ahead of you.")
}

pub fn image_caption(
    flavor: ImageFlavor,
    mention: &str,
    prompt: &str,
    enhanced: Option<&str>,
    repeat: u32,
) -> String {
    let noun = if repeat > 1 { "Pack" } else { "Gen" };
    let mut caption = format!("{flavor} {noun} for {mention}: Prompt: `{prompt}`");
    if let Some(enhanced) = enhanced {
        caption.push_str(&format!(" Enhanced Prompt: `{enhanced}`"));
    }
    caption
}

pub fn music_caption(mention: &str, prompt: &str, elapsed: Duration) -> String {
    format!(
        "Ace Gen for {mention}: Prompt: `{prompt}` Time:`{:.2} seconds`",
        elapsed.as_secs_f64()
    )
}

pub fn pack_caption(mention: &str) -> String {
    format!("Card Pack for {mention}")
}

pub fn history_cleared(mention: &str) -> String {
    format!("{mention} chat history cleared.")
}

pub fn ban_toggled(id: &str, banned: bool) -> String {
    format!("Ban toggled for user:{id} Banned:{}", if banned { "True" } else { "False" })
}

/// The message a requester sees when their job failed.
pub fn error_report(
    mention: &str,
    display_name: &str,
    prompt: Option<&str>,
    err: &MetatronError,
) -> String {
    match prompt {
        Some(prompt) => format!("{mention} {display_name} Error for `{prompt}`: {err}"),
        None => format!("{mention} {display_name} Error: {err}"),
    }
}
