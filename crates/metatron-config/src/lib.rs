// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Metatron generation bot.
//!
//! TOML parsing with strict validation (`deny_unknown_fields`), XDG file
//! hierarchy lookup, environment variable overrides, and miette diagnostics
//! with typo suggestions.
//!
//! ```no_run
//! use metatron_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("max per user: {}", config.queue.max_user_queue);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::MetatronConfig;

/// Loads configuration from the XDG hierarchy and validates it.
pub fn load_and_validate() -> Result<MetatronConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Loads configuration from an explicit file (plus env overrides) and validates it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<MetatronConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Loads configuration from a TOML string and validates it.
pub fn load_and_validate_str(toml_content: &str) -> Result<MetatronConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Reads every config file that exists so errors can carry source spans.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/metatron/metatron.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("metatron/metatron.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("metatron.toml"));
    }

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}

/// Renders the effective configuration as TOML, hiding secrets.
pub fn render_redacted(config: &MetatronConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    let redact = |value: &mut Option<String>| {
        if value.is_some() {
            *value = Some("<redacted>".to_string());
        }
    };
    redact(&mut shown.telegram.bot_token);
    redact(&mut shown.twitch.client_secret);
    toml::to_string_pretty(&shown)
}
