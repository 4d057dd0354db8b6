// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Metatron workspace.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a delivered message on a chat surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Backend,
    Storage,
    EventSource,
}

// --- Channel types ---

/// Where a reply is delivered: a channel adapter name plus a chat on that surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub channel: String,
    pub chat_id: String,
}

impl ReplyTarget {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// Broad media category for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AttachmentKind {
    Image,
    Audio,
    Document,
}

/// A binary payload delivered alongside a message.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn png(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: "image/png".into(),
            data,
        }
    }

    pub fn kind(&self) -> AttachmentKind {
        if self.mime_type.starts_with("image/") {
            AttachmentKind::Image
        } else if self.mime_type.starts_with("audio/") {
            AttachmentKind::Audio
        } else {
            AttachmentKind::Document
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Follow-up actions a requester can trigger from a delivered result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ActionKind {
    Reroll,
    Mail,
    Delete,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reroll => "Reroll",
            Self::Mail => "Mail",
            Self::Delete => "Delete",
        }
    }
}

/// A button attached to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAction {
    pub kind: ActionKind,
    pub token: String,
}

/// A message to be delivered through a channel adapter.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub target: Option<ReplyTarget>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub actions: Vec<MessageAction>,
    /// Hide attachments behind a spoiler overlay where the surface supports it.
    pub spoiler: bool,
}

impl OutboundMessage {
    pub fn text(target: ReplyTarget, content: impl Into<String>) -> Self {
        Self {
            target: Some(target),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone)]
pub struct ChannelCapabilities {
    pub supports_buttons: bool,
    pub supports_attachments: bool,
    pub supports_ephemeral: bool,
    pub max_message_length: Option<usize>,
    /// How long acknowledgements stay visible before being removed.
    pub ack_ttl: Option<Duration>,
}

// --- Backend types ---

/// One turn of a stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

impl HistoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A request for a text completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub prompt: String,
    pub model_name: Option<String>,
    /// Prior conversation, oldest first. `None` sends no history at all.
    pub messages: Option<Vec<HistoryEntry>>,
}

/// Image generation pipelines offered by the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ImageFlavor {
    #[strum(serialize = "SDXL")]
    Sdxl,
    #[strum(serialize = "Flux")]
    Flux,
    /// Prompt-guided edit of a supplied source image.
    #[strum(serialize = "Flux Edit")]
    FluxEdit,
}

/// A request for one batch of images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub model_name: Option<String>,
    pub lora_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: u32,
    pub batch_size: u32,
    pub source_image: Option<Vec<u8>>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            model_name: None,
            lora_name: None,
            width: None,
            height: None,
            steps: 30,
            batch_size: 1,
            source_image: None,
        }
    }
}

/// A request for one generated audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicRequest {
    pub prompt: String,
    pub lyrics: String,
    pub duration_secs: u32,
    pub infer_steps: u32,
}
