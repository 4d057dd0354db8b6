// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express, such as non-zero limits
//! and credentials that become mandatory once a feature is enabled.

use crate::diagnostic::ConfigError;
use crate::model::MetatronConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validates a deserialized configuration, collecting every failure.
pub fn validate_config(config: &MetatronConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::validation(
            "agent.log_level",
            format!(
                "must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.agent.log_level
            ),
        ));
    }

    if config.queue.max_user_queue == 0 {
        errors.push(ConfigError::validation(
            "queue.max_user_queue",
            "must be at least 1",
        ));
    }

    if config.queue.max_total_depth == Some(0) {
        errors.push(ConfigError::validation(
            "queue.max_total_depth",
            "must be at least 1 when set",
        ));
    }

    if config.history.max_messages == 0 {
        errors.push(ConfigError::validation(
            "history.max_messages",
            "must be at least 1",
        ));
    }

    if config.history.users_dir.trim().is_empty() {
        errors.push(ConfigError::validation(
            "history.users_dir",
            "must not be empty",
        ));
    }

    let base_url = config.avernus.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::validation(
            "avernus.base_url",
            format!("must start with http:// or https://, got `{base_url}`"),
        ));
    }

    if config.avernus.timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "avernus.timeout_secs",
            "must be at least 1",
        ));
    }

    if !config.avernus.enhance_prompt.contains("{prompt}") {
        errors.push(ConfigError::validation(
            "avernus.enhance_prompt",
            "must contain the `{prompt}` placeholder",
        ));
    }

    if config.cards.pack_size == 0 || config.cards.pack_size > 10 {
        errors.push(ConfigError::validation(
            "cards.pack_size",
            format!("must be between 1 and 10, got {}", config.cards.pack_size),
        ));
    }

    if config.twitch.enabled {
        let required = [
            ("twitch.client_id", &config.twitch.client_id),
            ("twitch.client_secret", &config.twitch.client_secret),
            ("twitch.channel_id", &config.twitch.channel_id),
            ("twitch.reward_chat_id", &config.twitch.reward_chat_id),
        ];
        for (field, value) in required {
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                errors.push(ConfigError::validation(
                    field,
                    "is required when twitch.enabled = true",
                ));
            }
        }
        if config.twitch.reconnect_delay_secs == 0 {
            errors.push(ConfigError::validation(
                "twitch.reconnect_delay_secs",
                "must be at least 1",
            ));
        }
        if config.twitch.token_check_interval_secs == 0 {
            errors.push(ConfigError::validation(
                "twitch.token_check_interval_secs",
                "must be at least 1",
            ));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&MetatronConfig::default()).is_ok());
    }

    #[test]
    fn zero_limits_are_rejected_together() {
        let mut config = MetatronConfig::default();
        config.queue.max_user_queue = 0;
        config.history.max_messages = 0;
        let errors = validate_config(&config).expect_err("zero limits should fail");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn enabled_twitch_requires_credentials() {
        let mut config = MetatronConfig::default();
        config.twitch.enabled = true;
        config.twitch.client_id = Some("abc".into());
        let errors = validate_config(&config).expect_err("missing credentials should fail");
        let fields: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(fields.iter().any(|f| f.contains("twitch.client_secret")));
        assert!(fields.iter().any(|f| f.contains("twitch.reward_chat_id")));
        assert!(!fields.iter().any(|f| f.contains("twitch.client_id")));
    }

    #[test]
    fn enhance_prompt_needs_placeholder() {
        let mut config = MetatronConfig::default();
        config.avernus.enhance_prompt = "describe it".into();
        assert!(validate_config(&config).is_err());
    }
}
