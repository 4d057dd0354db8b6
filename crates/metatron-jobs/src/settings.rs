// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution-time settings shared by every job.

use std::collections::BTreeMap;

use metatron_config::model::{LoraPreset, MetatronConfig};

/// The slice of configuration jobs read while executing.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub llm_model: Option<String>,
    pub card_llm_model: Option<String>,
    /// Template with a `{prompt}` placeholder for enhanced image prompts.
    pub enhance_prompt: String,
    pub history_cap: usize,
    pub card_pack_size: u32,
    /// Per-chat LoRA applied to card art, keyed by chat id.
    pub channel_loras: BTreeMap<String, LoraPreset>,
}

impl JobSettings {
    pub fn from_config(config: &MetatronConfig) -> Self {
        Self {
            llm_model: config.avernus.llm_model.clone(),
            card_llm_model: config.avernus.card_llm_model.clone(),
            enhance_prompt: config.avernus.enhance_prompt.clone(),
            history_cap: config.history.max_messages,
            card_pack_size: u32::try_from(config.cards.pack_size).unwrap_or(u32::MAX),
            channel_loras: config.cards.channel_loras.clone(),
        }
    }

    pub fn enhancement_request(&self, prompt: &str) -> String {
        self.enhance_prompt.replace("{prompt}", prompt)
    }

    /// Card model, falling back to the chat model.
    pub fn card_model(&self) -> Option<String> {
        self.card_llm_model
            .clone()
            .or_else(|| self.llm_model.clone())
    }

    pub fn lora_for(&self, chat_id: &str) -> Option<&LoraPreset> {
        self.channel_loras.get(chat_id)
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from_config(&MetatronConfig::default())
    }
}
