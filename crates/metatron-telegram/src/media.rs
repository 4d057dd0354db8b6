// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source image extraction for edit commands.

use metatron_core::MetatronError;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileMeta;
use tracing::debug;

/// Downloads a file from Telegram servers by its file metadata.
pub async fn download_file(bot: &Bot, file_meta: &FileMeta) -> Result<Vec<u8>, MetatronError> {
    let file = bot
        .get_file(file_meta.id.clone())
        .await
        .map_err(|e| MetatronError::Channel {
            message: format!("failed to get file info: {e}"),
            source: Some(Box::new(e)),
        })?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| MetatronError::Channel {
            message: format!("failed to download file: {e}"),
            source: Some(Box::new(e)),
        })?;

    debug!(file_id = %file_meta.id, size = buf.len(), "downloaded file from telegram");
    Ok(buf)
}

/// The attachment on a message that could serve as a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAttachment<'a> {
    Photo(&'a FileMeta),
    ImageDocument(&'a FileMeta),
    /// A document whose content type is not an image.
    NotAnImage(String),
}

/// Finds a source image on `msg`, falling back to the message it replies to.
pub fn find_source(msg: &Message) -> Option<SourceAttachment<'_>> {
    attachment_on(msg).or_else(|| msg.reply_to_message().and_then(attachment_on))
}

fn attachment_on(msg: &Message) -> Option<SourceAttachment<'_>> {
    if let Some(photos) = msg.photo() {
        // Telegram provides multiple sizes; the last one is the largest.
        return photos.last().map(|p| SourceAttachment::Photo(&p.file));
    }
    let doc = msg.document()?;
    let mime = doc
        .mime_type
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_default();
    if is_image_type(&mime) {
        Some(SourceAttachment::ImageDocument(&doc.file))
    } else {
        Some(SourceAttachment::NotAnImage(mime))
    }
}

pub fn is_image_type(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

/// Downloads the source image for an edit request.
///
/// Non-image attachments are rejected with [`MetatronError::InvalidRequest`].
pub async fn source_image(bot: &Bot, msg: &Message) -> Result<Option<Vec<u8>>, MetatronError> {
    match find_source(msg) {
        None => Ok(None),
        Some(SourceAttachment::Photo(file)) | Some(SourceAttachment::ImageDocument(file)) => {
            download_file(bot, file).await.map(Some)
        }
        Some(SourceAttachment::NotAnImage(mime)) => Err(MetatronError::InvalidRequest(format!(
            "attachment must be an image, got `{}`",
            if mime.is_empty() { "unknown" } else { &mime }
        ))),
    }
}
