// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./metatron.toml` > `~/.config/metatron/metatron.toml` >
//! `/etc/metatron/metatron.toml` with environment variable overrides via `METATRON_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MetatronConfig;

/// Sections that environment variables may address, in mapping order.
const ENV_SECTIONS: &[&str] = &[
    "agent", "queue", "history", "avernus", "telegram", "twitch", "cards",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/metatron/metatron.toml` (system-wide)
/// 3. `~/.config/metatron/metatron.toml` (user XDG config)
/// 4. `./metatron.toml` (local directory)
/// 5. `METATRON_*` environment variables
pub fn load_config() -> Result<MetatronConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MetatronConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MetatronConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MetatronConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MetatronConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MetatronConfig::default()))
        .merge(Toml::file("/etc/metatron/metatron.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("metatron/metatron.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("metatron.toml"))
        .merge(env_provider())
}

/// Maps a prefix-stripped, lowercased env key onto a dotted config path.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `telegram_bot_token` maps to `telegram.bot_token`, not `telegram.bot.token`.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("METATRON_").map(|key| map_env_key(key.as_str()).into())
}
