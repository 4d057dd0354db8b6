// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the Avernus HTTP API.

use metatron_core::HistoryEntry;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DIMENSION: u32 = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct LlmChatBody<'a> {
    pub prompt: &'a str,
    pub model_name: Option<&'a str>,
    pub messages: Option<&'a [HistoryEntry]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageBody<'a> {
    pub prompt: &'a str,
    pub negative_prompt: Option<&'a str>,
    pub model_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora_name: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub batch_size: u32,
    /// Base64-encoded source image for edits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MusicBody<'a> {
    pub prompt: &'a str,
    pub lyrics: &'a str,
    pub audio_duration: u32,
    pub infer_step: u32,
}

/// Shapes the chat endpoint is known to answer with.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatReply {
    Text(String),
    Wrapped { response: String },
    Error {
        #[serde(rename = "ERROR")]
        error: String,
    },
}
