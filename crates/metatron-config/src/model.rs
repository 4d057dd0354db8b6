// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Metatron generation bot.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use metatron_core::ExternalBucketing;
use serde::{Deserialize, Serialize};

/// Top-level Metatron configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetatronConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Admission limits.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Per-user state files and conversation history.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Generation backend settings.
    #[serde(default)]
    pub avernus: AvernusConfig,

    /// Telegram bot integration settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Twitch reward redemption bridge.
    #[serde(default)]
    pub twitch: TwitchConfig,

    /// Trading card generation.
    #[serde(default)]
    pub cards: CardsConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file that receives a copy of every log line.
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_agent_name() -> String {
    "metatron".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Admission limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum jobs a single identity may have queued or executing.
    #[serde(default = "default_max_user_queue")]
    pub max_user_queue: usize,

    /// Optional ceiling on the total number of waiting jobs.
    #[serde(default)]
    pub max_total_depth: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_user_queue: default_max_user_queue(),
            max_total_depth: None,
        }
    }
}

fn default_max_user_queue() -> usize {
    2
}

/// Per-user state and conversation history.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Number of history entries kept per identity; older ones are evicted first.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Directory holding one JSON document per identity.
    #[serde(default = "default_users_dir")]
    pub users_dir: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            users_dir: default_users_dir(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

fn default_users_dir() -> String {
    "configs/users".to_string()
}

/// Generation backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AvernusConfig {
    /// Base URL of the backend, e.g. `http://127.0.0.1:6969`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Model used for chat and prompt enhancement. Backend default when unset.
    #[serde(default)]
    pub llm_model: Option<String>,

    /// Model used for card titles and flavour text.
    #[serde(default)]
    pub card_llm_model: Option<String>,

    /// Template used to enhance prompts. `{prompt}` is replaced with the user prompt.
    #[serde(default = "default_enhance_prompt")]
    pub enhance_prompt: String,
}

impl Default for AvernusConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            llm_model: None,
            card_llm_model: None,
            enhance_prompt: default_enhance_prompt(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:6969".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_enhance_prompt() -> String {
    "Turn the following prompt into a three sentence visual description of it. Here is the prompt: {prompt}"
        .to_string()
}

/// Telegram bot integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Telegram user ids allowed to run admin commands.
    #[serde(default)]
    pub admin_users: Vec<String>,

    /// Seconds before acknowledgements are removed.
    #[serde(default = "default_ack_ttl_secs")]
    pub ack_ttl_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            admin_users: Vec::new(),
            ack_ttl_secs: default_ack_ttl_secs(),
        }
    }
}

fn default_ack_ttl_secs() -> u64 {
    5
}

/// Twitch reward redemption bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TwitchConfig {
    /// Whether the EventSub listener runs at all.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Broadcaster user id whose redemptions are watched.
    #[serde(default)]
    pub channel_id: Option<String>,

    /// JSON file holding the access and refresh tokens.
    #[serde(default = "default_token_file")]
    pub token_file: String,

    /// Telegram chat that receives redeemed card packs.
    #[serde(default)]
    pub reward_chat_id: Option<String>,

    /// Whether all Twitch redeemers share one admission bucket.
    #[serde(default = "default_shared_bucket")]
    pub shared_bucket: bool,

    #[serde(default = "default_eventsub_url")]
    pub eventsub_url: String,

    #[serde(default = "default_helix_url")]
    pub helix_url: String,

    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_token_check_interval_secs")]
    pub token_check_interval_secs: u64,
}

impl TwitchConfig {
    pub fn bucketing(&self) -> ExternalBucketing {
        if self.shared_bucket {
            ExternalBucketing::Shared
        } else {
            ExternalBucketing::PerPrincipal
        }
    }
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: None,
            client_secret: None,
            channel_id: None,
            token_file: default_token_file(),
            reward_chat_id: None,
            shared_bucket: default_shared_bucket(),
            eventsub_url: default_eventsub_url(),
            helix_url: default_helix_url(),
            oauth_url: default_oauth_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            token_check_interval_secs: default_token_check_interval_secs(),
        }
    }
}

fn default_token_file() -> String {
    "configs/twitch_tokens.json".to_string()
}

fn default_shared_bucket() -> bool {
    true
}

fn default_eventsub_url() -> String {
    "wss://eventsub.wss.twitch.tv/ws".to_string()
}

fn default_helix_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_oauth_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_token_check_interval_secs() -> u64 {
    60
}

/// Trading card generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CardsConfig {
    /// Cards per pack.
    #[serde(default = "default_pack_size")]
    pub pack_size: usize,

    /// Per-chat LoRA presets, keyed by chat id.
    #[serde(default)]
    pub channel_loras: BTreeMap<String, LoraPreset>,
}

impl Default for CardsConfig {
    fn default() -> Self {
        Self {
            pack_size: default_pack_size(),
            channel_loras: BTreeMap::new(),
        }
    }
}

fn default_pack_size() -> usize {
    3
}

/// A LoRA applied to card art in a particular chat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoraPreset {
    pub lora_name: String,
    /// Trigger words prepended to the art prompt.
    #[serde(default)]
    pub prompt_prefix: String,
}
