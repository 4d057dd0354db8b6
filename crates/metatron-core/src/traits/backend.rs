// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation backend trait.

use async_trait::async_trait;

use crate::error::MetatronError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatRequest, ImageFlavor, ImageRequest, MusicRequest};

/// The remote service that does the actual generating.
///
/// Calls are slow (minutes for large batches) and must only be made from
/// the queue processor so that at most one runs at a time.
#[async_trait]
pub trait GenerationBackend: PluginAdapter {
    /// Text completion, optionally continuing a conversation.
    async fn chat(&self, request: ChatRequest) -> Result<String, MetatronError>;

    /// Generates a batch of PNG-encoded images.
    async fn generate_images(
        &self,
        flavor: ImageFlavor,
        request: ImageRequest,
    ) -> Result<Vec<Vec<u8>>, MetatronError>;

    /// Generates one audio track and returns its encoded bytes.
    async fn generate_music(&self, request: MusicRequest) -> Result<Vec<u8>, MetatronError>;
}
