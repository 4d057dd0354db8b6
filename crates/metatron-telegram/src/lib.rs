// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram surface for the Metatron generation bot.
//!
//! [`TelegramChannel`] implements [`ChannelAdapter`] so jobs can deliver
//! results with inline buttons and spoilers. [`router::run`] long-polls for
//! updates and turns commands, mentions, and button presses into
//! submissions on the shared [`metatron_jobs::Dispatcher`].

pub mod buttons;
pub mod commands;
pub mod handler;
pub mod media;
pub mod router;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use metatron_config::model::TelegramConfig;
use metatron_core::{
    AdapterType, Attachment, AttachmentKind, ChannelAdapter, ChannelCapabilities, HealthStatus,
    MessageId, MetatronError, OutboundMessage, PluginAdapter, ReplyTarget,
};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardMarkup, InputFile, InputMedia, InputMediaAudio, InputMediaDocument,
    InputMediaPhoto, Recipient,
};
use tracing::{debug, warn};

pub use router::run;

/// Telegram caps photo, audio, and document captions at this many characters.
pub const MAX_CAPTION_CHARS: usize = 1024;
/// Telegram caps text messages at this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;
/// Media groups hold between this many items...
const MIN_GROUP_ITEMS: usize = 2;
/// ...and this many.
const MAX_GROUP_ITEMS: usize = 10;
const COMPANION_CAPACITY: usize = 512;

/// Messages delivered together with the one carrying the buttons.
struct Companions {
    chat: ChatId,
    anchor: i32,
    others: Vec<i32>,
}

/// Outbound Telegram adapter.
pub struct TelegramChannel {
    bot: Bot,
    config: TelegramConfig,
    companions: Mutex<VecDeque<Companions>>,
}

impl TelegramChannel {
    /// Creates the adapter. Requires `config.bot_token` to be set.
    pub fn new(config: TelegramConfig) -> Result<Self, MetatronError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            MetatronError::Config("telegram.bot_token is required for Telegram adapter".into())
        })?;
        if token.is_empty() {
            return Err(MetatronError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        Ok(Self {
            bot: Bot::new(token),
            config,
            companions: Mutex::new(VecDeque::new()),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn ack_ttl(&self) -> Duration {
        Duration::from_secs(self.config.ack_ttl_secs)
    }

    fn remember_companions(&self, chat: ChatId, anchor: i32, others: Vec<i32>) {
        if others.is_empty() {
            return;
        }
        let mut companions = self
            .companions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if companions.len() >= COMPANION_CAPACITY {
            companions.pop_front();
        }
        companions.push_back(Companions {
            chat,
            anchor,
            others,
        });
    }

    fn take_companions(&self, chat: ChatId, anchor: i32) -> Vec<i32> {
        let mut companions = self
            .companions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match companions
            .iter()
            .position(|c| c.chat == chat && c.anchor == anchor)
        {
            Some(index) => companions
                .remove(index)
                .map(|c| c.others)
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, MetatronError> {
        let mut request = self.bot.send_message(Recipient::Id(chat), text);
        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }
        request.await.map_err(|e| MetatronError::Channel {
            message: format!("failed to send message: {e}"),
            source: Some(Box::new(e)),
        })
    }

    async fn send_single(
        &self,
        chat: ChatId,
        attachment: &Attachment,
        caption: Option<&str>,
        spoiler: bool,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<Message, MetatronError> {
        let file = input_file(attachment);
        let result = match attachment.kind() {
            AttachmentKind::Image => {
                let mut request = self.bot.send_photo(Recipient::Id(chat), file);
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                if spoiler {
                    request = request.has_spoiler(true);
                }
                if let Some(markup) = markup {
                    request = request.reply_markup(markup);
                }
                request.await
            }
            AttachmentKind::Audio => {
                let mut request = self.bot.send_audio(Recipient::Id(chat), file);
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                if let Some(markup) = markup {
                    request = request.reply_markup(markup);
                }
                request.await
            }
            AttachmentKind::Document => {
                let mut request = self.bot.send_document(Recipient::Id(chat), file);
                if let Some(caption) = caption {
                    request = request.caption(caption);
                }
                if let Some(markup) = markup {
                    request = request.reply_markup(markup);
                }
                request.await
            }
        };
        result.map_err(|e| MetatronError::Channel {
            message: format!("failed to send {}: {e}", attachment.kind()),
            source: Some(Box::new(e)),
        })
    }

    /// Sends attachments as media groups and returns every delivered id.
    async fn send_group(
        &self,
        chat: ChatId,
        attachments: &[Attachment],
        caption: Option<&str>,
        spoiler: bool,
    ) -> Result<Vec<i32>, MetatronError> {
        let mut ids = Vec::with_capacity(attachments.len());
        for (batch_index, range) in group_batches(attachments.len()).into_iter().enumerate() {
            let media = attachments[range]
                .iter()
                .enumerate()
                .map(|(i, attachment)| {
                    let caption = (batch_index == 0 && i == 0)
                        .then(|| caption.map(str::to_string))
                        .flatten();
                    group_item(attachment, caption, spoiler)
                })
                .collect::<Vec<_>>();
            let sent = self
                .bot
                .send_media_group(Recipient::Id(chat), media)
                .await
                .map_err(|e| MetatronError::Channel {
                    message: format!("failed to send media group: {e}"),
                    source: Some(Box::new(e)),
                })?;
            ids.extend(sent.iter().map(|m| m.id.0));
        }
        Ok(ids)
    }
}

fn input_file(attachment: &Attachment) -> InputFile {
    InputFile::memory(attachment.data.clone()).file_name(attachment.filename.clone())
}

fn group_item(attachment: &Attachment, caption: Option<String>, spoiler: bool) -> InputMedia {
    let file = input_file(attachment);
    match attachment.kind() {
        AttachmentKind::Image => {
            let mut photo = InputMediaPhoto::new(file);
            photo.caption = caption;
            photo.has_spoiler = spoiler;
            InputMedia::Photo(photo)
        }
        AttachmentKind::Audio => {
            let mut audio = InputMediaAudio::new(file);
            audio.caption = caption;
            InputMedia::Audio(audio)
        }
        AttachmentKind::Document => {
            let mut document = InputMediaDocument::new(file);
            document.caption = caption;
            InputMedia::Document(document)
        }
    }
}

/// Splits `len` items into contiguous media group ranges.
///
/// Batches are as even as possible so none falls below the group minimum;
/// 21 items go out as 7 + 7 + 7 rather than 10 + 10 + 1. `len` must be at
/// least [`MIN_GROUP_ITEMS`].
fn group_batches(len: usize) -> Vec<std::ops::Range<usize>> {
    if len < MIN_GROUP_ITEMS {
        return Vec::new();
    }
    let batches = len.div_ceil(MAX_GROUP_ITEMS);
    let base = len / batches;
    let larger = len % batches;
    let mut start = 0;
    (0..batches)
        .map(|i| {
            let size = base + usize::from(i < larger);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// Media groups must not mix audio or documents with other kinds.
fn groupable(attachments: &[Attachment]) -> bool {
    if attachments.len() < MIN_GROUP_ITEMS {
        return false;
    }
    let Some(first) = attachments.first() else {
        return false;
    };
    let kind = first.kind();
    attachments.iter().all(|a| a.kind() == kind)
}

fn fits_caption(content: &str) -> bool {
    content.chars().count() <= MAX_CAPTION_CHARS
}

/// Parses a chat id carried in a [`ReplyTarget`].
pub fn parse_chat_id(target: &ReplyTarget) -> Result<ChatId, MetatronError> {
    target
        .chat_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|e| MetatronError::Channel {
            message: format!("invalid chat_id `{}`: {e}", target.chat_id),
            source: None,
        })
}

fn parse_message_id(id: &MessageId) -> Result<teloxide::types::MessageId, MetatronError> {
    id.0.parse::<i32>()
        .map(teloxide::types::MessageId)
        .map_err(|e| MetatronError::Channel {
            message: format!("invalid message_id `{}`: {e}", id.0),
            source: None,
        })
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        handler::CHANNEL_NAME
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, MetatronError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), MetatronError> {
        debug!("telegram channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_buttons: true,
            supports_attachments: true,
            supports_ephemeral: true,
            max_message_length: Some(MAX_MESSAGE_CHARS),
            ack_ttl: Some(self.ack_ttl()),
        }
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, MetatronError> {
        let target = msg
            .target
            .as_ref()
            .ok_or_else(|| MetatronError::channel("outbound message has no target"))?;
        let chat = parse_chat_id(target)?;
        let markup = buttons::keyboard(&msg.actions);
        let content = msg.content.trim();

        if msg.attachments.is_empty() {
            if content.is_empty() {
                return Err(MetatronError::channel("refusing to send an empty message"));
            }
            let sent = self.send_text(chat, content, markup).await?;
            return Ok(MessageId(sent.id.0.to_string()));
        }

        // Long content goes out as its own message ahead of the media.
        let mut caption = (!content.is_empty()).then_some(content);
        let mut lead = None;
        if caption.is_some_and(|c| !fits_caption(c)) {
            lead = Some(self.send_text(chat, content, None).await?.id.0);
            caption = None;
        }

        let (anchor, mut others) = if let [single] = msg.attachments.as_slice() {
            let sent = self
                .send_single(chat, single, caption, msg.spoiler, markup)
                .await?;
            (sent.id.0, Vec::new())
        } else if groupable(&msg.attachments) {
            let ids = self
                .send_group(chat, &msg.attachments, caption, msg.spoiler)
                .await?;
            // Media groups cannot carry a keyboard, so buttons ride on a follow-up.
            match markup {
                Some(markup) => {
                    let sent = self.send_text(chat, "\u{2b06}", Some(markup)).await?;
                    (sent.id.0, ids)
                }
                None => match ids.split_first() {
                    Some((&anchor, rest)) => (anchor, rest.to_vec()),
                    None => return Err(MetatronError::channel("media group was not delivered")),
                },
            }
        } else {
            let mut ids = Vec::with_capacity(msg.attachments.len());
            let last = msg.attachments.len() - 1;
            let mut markup = markup;
            for (i, attachment) in msg.attachments.iter().enumerate() {
                let caption = if i == 0 { caption } else { None };
                let markup = if i == last { markup.take() } else { None };
                let sent = self
                    .send_single(chat, attachment, caption, msg.spoiler, markup)
                    .await?;
                ids.push(sent.id.0);
            }
            let anchor = ids.pop().unwrap_or_default();
            (anchor, ids)
        };

        others.extend(lead);
        debug!(chat_id = chat.0, anchor, companions = others.len(), "delivered result");
        self.remember_companions(chat, anchor, others);
        Ok(MessageId(anchor.to_string()))
    }

    async fn acknowledge(&self, target: &ReplyTarget, text: &str) -> Result<(), MetatronError> {
        let chat = parse_chat_id(target)?;
        let sent = self.send_text(chat, text, None).await?;
        let bot = self.bot.clone();
        let ttl = self.ack_ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = bot.delete_message(chat, sent.id).await {
                debug!(chat_id = chat.0, error = %e, "failed to remove acknowledgement");
            }
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        target: &ReplyTarget,
        message_id: &MessageId,
    ) -> Result<(), MetatronError> {
        let chat = parse_chat_id(target)?;
        let anchor = parse_message_id(message_id)?;
        for other in self.take_companions(chat, anchor.0) {
            if let Err(e) = self
                .bot
                .delete_message(chat, teloxide::types::MessageId(other))
                .await
            {
                warn!(chat_id = chat.0, message_id = other, error = %e, "failed to delete companion message");
            }
        }
        self.bot
            .delete_message(chat, anchor)
            .await
            .map_err(|e| MetatronError::Channel {
                message: format!("failed to delete message: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn new_requires_bot_token() {
        assert!(TelegramChannel::new(config(None)).is_err());
        assert!(TelegramChannel::new(config(Some(""))).is_err());
        assert!(TelegramChannel::new(config(Some("123456:ABC-DEF1234ghIkl"))).is_ok());
    }

    #[test]
    fn capabilities_report_buttons_and_ack_ttl() {
        let channel = TelegramChannel::new(config(Some("test:token"))).unwrap();
        let caps = channel.capabilities();
        assert!(caps.supports_buttons);
        assert!(caps.supports_attachments);
        assert!(caps.supports_ephemeral);
        assert_eq!(caps.max_message_length, Some(4096));
        assert_eq!(caps.ack_ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn chat_id_must_be_numeric() {
        let ok = ReplyTarget::new("telegram", "-100123");
        assert_eq!(parse_chat_id(&ok).unwrap(), ChatId(-100123));
        let bad = ReplyTarget::new("telegram", "general");
        assert!(matches!(
            parse_chat_id(&bad),
            Err(MetatronError::Channel { .. })
        ));
    }

    #[test]
    fn mixed_attachments_are_not_grouped() {
        let png = Attachment::png("a.png", vec![1]);
        let wav = Attachment {
            filename: "a.wav".into(),
            mime_type: "audio/wav".into(),
            data: vec![2],
        };
        assert!(groupable(&[png.clone(), png.clone()]));
        assert!(!groupable(&[png.clone(), wav]));
        assert!(!groupable(&[png]));
        assert!(!groupable(&[]));
    }

    #[test]
    fn media_groups_never_leave_a_single_straggler() {
        let sizes = |len: usize| -> Vec<usize> { group_batches(len).iter().map(|r| r.len()).collect() };
        assert_eq!(sizes(2), [2]);
        assert_eq!(sizes(10), [10]);
        assert_eq!(sizes(11), [6, 5]);
        assert_eq!(sizes(21), [7, 7, 7]);
        assert_eq!(sizes(100), [10; 10]);
        assert!(sizes(1).is_empty());

        for len in MIN_GROUP_ITEMS..=120 {
            let batches = group_batches(len);
            assert_eq!(batches.first().map(|r| r.start), Some(0));
            assert_eq!(batches.last().map(|r| r.end), Some(len));
            assert!(batches.windows(2).all(|w| w[0].end == w[1].start));
            assert!(
                batches
                    .iter()
                    .all(|r| (MIN_GROUP_ITEMS..=MAX_GROUP_ITEMS).contains(&r.len())),
                "bad split for {len}"
            );
        }
    }

    #[test]
    fn caption_limit_counts_characters() {
        assert!(fits_caption(&"é".repeat(MAX_CAPTION_CHARS)));
        assert!(!fits_caption(&"a".repeat(MAX_CAPTION_CHARS + 1)));
    }

    #[test]
    fn companions_are_taken_once() {
        let channel = TelegramChannel::new(config(Some("test:token"))).unwrap();
        channel.remember_companions(ChatId(1), 10, vec![7, 8, 9]);
        assert_eq!(channel.take_companions(ChatId(1), 10), vec![7, 8, 9]);
        assert!(channel.take_companions(ChatId(1), 10).is_empty());
        assert!(channel.take_companions(ChatId(2), 10).is_empty());
    }
}
