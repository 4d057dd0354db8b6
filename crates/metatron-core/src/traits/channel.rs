// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for chat surfaces.

use async_trait::async_trait;

use crate::error::MetatronError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelCapabilities, MessageId, OutboundMessage, ReplyTarget};

/// Outbound half of a chat surface.
///
/// Jobs deliver results through this trait; the surface decides how
/// attachments, buttons, and spoilers are rendered.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Sends a message and returns the id of the message carrying any buttons.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, MetatronError>;

    /// Sends a short acknowledgement that disappears on its own.
    async fn acknowledge(&self, target: &ReplyTarget, text: &str) -> Result<(), MetatronError>;

    /// Removes a previously delivered message.
    async fn delete_message(
        &self,
        target: &ReplyTarget,
        message_id: &MessageId,
    ) -> Result<(), MetatronError>;
}
