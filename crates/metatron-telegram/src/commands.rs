// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slash command parsing.
//!
//! Commands take a prompt followed by optional `key=value` options, each
//! introduced by a `|`:
//!
//! ```text
//! /sdxl_gen a red fox in snow | negative_prompt=blurry, dark | width=768 | enhance=true
//! ```

use metatron_core::ImageFlavor;
use metatron_jobs::spec::{ImageSpec, JobSpec, MusicSpec};
use thiserror::Error;

pub const HELP_TEXT: &str = "\
/sdxl_gen <prompt> | negative_prompt= | width= | height= | batch_size= | lora= | enhance= | pack=
/flux_gen <prompt> | width= | height= | batch_size= | lora= | enhance= | pack=
/edit_gen <prompt> (attach or reply to an image)
/mtg_gen <prompt>
/mtg_gen_three_pack <prompt>
/ace_gen <prompt> | lyrics= | duration=
/forget";

const IMAGE_KEYS: &[&str] = &[
    "negative_prompt",
    "width",
    "height",
    "batch_size",
    "lora",
    "enhance",
    "pack",
];
const EDIT_KEYS: &[&str] = &["width", "height", "lora", "enhance"];
const MUSIC_KEYS: &[&str] = &["lyrics", "duration"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("/{command} needs a prompt")]
    MissingPrompt { command: String },
    #[error("/toggle_user_ban needs a user id")]
    MissingUserId,
    #[error("unknown option `{key}` for /{command} (valid: {valid})")]
    UnknownOption {
        command: String,
        key: String,
        valid: String,
    },
    #[error("option `{part}` is not in key=value form")]
    Malformed { part: String },
    #[error("option `{key}` has invalid value `{value}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOptions {
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub batch_size: Option<u32>,
    pub lora_name: Option<String>,
    pub enhance: bool,
    pub pack: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Image {
        flavor: ImageFlavor,
        prompt: String,
        options: ImageOptions,
    },
    Card {
        prompt: String,
    },
    CardPack {
        prompt: String,
    },
    Music {
        prompt: String,
        lyrics: Option<String>,
        duration_secs: Option<u32>,
    },
    Forget,
    ToggleBan {
        user_id: String,
    },
    Help,
}

impl Command {
    /// Whether the command needs a source image.
    pub fn needs_source_image(&self) -> bool {
        matches!(
            self,
            Self::Image {
                flavor: ImageFlavor::FluxEdit,
                ..
            }
        )
    }

    /// Converts a generation command into a job. `None` for admin and help
    /// commands.
    pub fn into_spec(self, pack_size: u32, source_image: Option<Vec<u8>>) -> Option<JobSpec> {
        match self {
            Self::Image {
                flavor,
                prompt,
                options,
            } => {
                let mut spec = ImageSpec::new(flavor, prompt);
                spec.negative_prompt = options.negative_prompt;
                spec.width = options.width;
                spec.height = options.height;
                if let Some(batch) = options.batch_size {
                    spec.batch_size = batch;
                }
                spec.lora_name = options.lora_name;
                spec.enhance = options.enhance;
                spec.repeat = options.pack.unwrap_or(1);
                spec.source_image = source_image;
                Some(JobSpec::Image(spec))
            }
            Self::Card { prompt } => Some(JobSpec::Card { prompt, count: 1 }),
            Self::CardPack { prompt } => Some(JobSpec::Card {
                prompt,
                count: pack_size,
            }),
            Self::Music {
                prompt,
                lyrics,
                duration_secs,
            } => Some(JobSpec::Music(MusicSpec {
                prompt,
                lyrics: lyrics.unwrap_or_else(|| "[inst]".to_string()),
                duration_secs: duration_secs.unwrap_or(MusicSpec::DEFAULT_DURATION_SECS),
            })),
            Self::Forget => Some(JobSpec::ClearHistory),
            Self::ToggleBan { .. } | Self::Help => None,
        }
    }
}

/// Parses `text` as a command addressed to `bot_username`.
///
/// Returns `Ok(None)` for plain text, unknown commands, and commands
/// addressed to another bot.
pub fn parse(text: &str, bot_username: &str) -> Result<Option<Command>, CommandError> {
    let Some(body) = text.trim_start().strip_prefix('/') else {
        return Ok(None);
    };
    let (head, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let (name, addressee) = head.split_once('@').unwrap_or((head, ""));
    if !addressee.is_empty() && !addressee.eq_ignore_ascii_case(bot_username) {
        return Ok(None);
    }

    let mut parts = rest.split('|');
    let prompt = parts.next().unwrap_or("").trim().to_string();
    let options: Vec<&str> = parts.map(str::trim).filter(|p| !p.is_empty()).collect();

    let require_prompt = |prompt: String| {
        if prompt.is_empty() {
            Err(CommandError::MissingPrompt {
                command: name.to_string(),
            })
        } else {
            Ok(prompt)
        }
    };

    let command = match name {
        "sdxl_gen" | "flux_gen" | "edit_gen" => {
            let (flavor, keys) = match name {
                "sdxl_gen" => (ImageFlavor::Sdxl, IMAGE_KEYS),
                "flux_gen" => (ImageFlavor::Flux, IMAGE_KEYS),
                _ => (ImageFlavor::FluxEdit, EDIT_KEYS),
            };
            let prompt = require_prompt(prompt)?;
            let mut parsed = ImageOptions::default();
            for (key, value) in split_options(name, &options, keys)? {
                match key {
                    "negative_prompt" => parsed.negative_prompt = Some(value.to_string()),
                    "width" => parsed.width = Some(parse_number(key, value)?),
                    "height" => parsed.height = Some(parse_number(key, value)?),
                    "batch_size" => parsed.batch_size = Some(parse_number(key, value)?),
                    "lora" => parsed.lora_name = Some(value.to_string()),
                    "enhance" => parsed.enhance = parse_bool(key, value)?,
                    "pack" => parsed.pack = Some(parse_number(key, value)?),
                    _ => {}
                }
            }
            Command::Image {
                flavor,
                prompt,
                options: parsed,
            }
        }
        "mtg_gen" => Command::Card {
            prompt: require_prompt(prompt)?,
        },
        "mtg_gen_three_pack" => Command::CardPack {
            prompt: require_prompt(prompt)?,
        },
        "ace_gen" => {
            let prompt = require_prompt(prompt)?;
            let mut lyrics = None;
            let mut duration_secs = None;
            for (key, value) in split_options(name, &options, MUSIC_KEYS)? {
                match key {
                    "lyrics" => lyrics = Some(value.replace("\\n", "\n")),
                    "duration" => duration_secs = Some(parse_number(key, value)?),
                    _ => {}
                }
            }
            Command::Music {
                prompt,
                lyrics,
                duration_secs,
            }
        }
        "forget" => Command::Forget,
        "toggle_user_ban" => {
            let user_id = rest.trim();
            if user_id.is_empty() {
                return Err(CommandError::MissingUserId);
            }
            Command::ToggleBan {
                user_id: user_id.to_string(),
            }
        }
        "help" | "start" => Command::Help,
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn split_options<'a>(
    command: &str,
    options: &[&'a str],
    valid: &[&'static str],
) -> Result<Vec<(&'static str, &'a str)>, CommandError> {
    options
        .iter()
        .map(|part| {
            let (key, value) = part.split_once('=').ok_or_else(|| CommandError::Malformed {
                part: part.to_string(),
            })?;
            let key = key.trim();
            let known = valid
                .iter()
                .find(|k| k.eq_ignore_ascii_case(key))
                .ok_or_else(|| CommandError::UnknownOption {
                    command: command.to_string(),
                    key: key.to_string(),
                    valid: valid.join(", "),
                })?;
            Ok((*known, value.trim()))
        })
        .collect()
}

fn parse_number(key: &str, value: &str) -> Result<u32, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CommandError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(CommandError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "metatron_bot";

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse("hello there", BOT).unwrap(), None);
    }

    #[test]
    fn sdxl_with_options() {
        let cmd = parse(
            "/sdxl_gen a red fox | negative_prompt=blurry, dark | width=768 | enhance=true",
            BOT,
        )
        .unwrap()
        .unwrap();
        let Command::Image {
            flavor,
            prompt,
            options,
        } = cmd
        else {
            panic!("expected image command");
        };
        assert_eq!(flavor, ImageFlavor::Sdxl);
        assert_eq!(prompt, "a red fox");
        assert_eq!(options.negative_prompt.as_deref(), Some("blurry, dark"));
        assert_eq!(options.width, Some(768));
        assert!(options.enhance);
    }

    #[test]
    fn addressed_to_other_bot_is_ignored() {
        assert_eq!(parse("/flux_gen@other_bot cat", BOT).unwrap(), None);
        assert!(parse("/flux_gen@Metatron_Bot cat", BOT).unwrap().is_some());
    }

    #[test]
    fn missing_prompt_is_an_error() {
        let err = parse("/mtg_gen", BOT).unwrap_err();
        assert_eq!(err.to_string(), "/mtg_gen needs a prompt");
    }

    #[test]
    fn unknown_option_lists_valid_keys() {
        let err = parse("/edit_gen bluer | batch_size=2", BOT).unwrap_err();
        assert!(matches!(err, CommandError::UnknownOption { .. }));
        assert!(err.to_string().contains("width, height, lora, enhance"));
    }

    #[test]
    fn bad_number_is_rejected() {
        let err = parse("/flux_gen cat | width=wide", BOT).unwrap_err();
        assert_eq!(
            err,
            CommandError::InvalidValue {
                key: "width".into(),
                value: "wide".into()
            }
        );
    }

    #[test]
    fn card_pack_uses_configured_size() {
        let cmd = parse("/mtg_gen_three_pack goblin", BOT).unwrap().unwrap();
        assert_eq!(
            cmd.into_spec(3, None),
            Some(JobSpec::Card {
                prompt: "goblin".into(),
                count: 3
            })
        );
    }

    #[test]
    fn music_defaults() {
        let cmd = parse("/ace_gen chill synthwave", BOT).unwrap().unwrap();
        let Some(JobSpec::Music(spec)) = cmd.into_spec(3, None) else {
            panic!("expected music spec");
        };
        assert_eq!(spec.duration_secs, 30);
        assert_eq!(spec.lyrics, "[inst]");
    }

    #[test]
    fn image_spec_keeps_flavor_batch_default() {
        let cmd = parse("/flux_gen cat | pack=2", BOT).unwrap().unwrap();
        let Some(JobSpec::Image(spec)) = cmd.into_spec(3, None) else {
            panic!("expected image spec");
        };
        assert_eq!(spec.batch_size, 1);
        assert_eq!(spec.repeat, 2);
    }

    #[test]
    fn toggle_ban_needs_id() {
        assert_eq!(
            parse("/toggle_user_ban 12345", BOT).unwrap(),
            Some(Command::ToggleBan {
                user_id: "12345".into()
            })
        );
        assert_eq!(
            parse("/toggle_user_ban", BOT).unwrap_err(),
            CommandError::MissingUserId
        );
    }

    #[test]
    fn edit_needs_source_image() {
        let cmd = parse("/edit_gen make it blue", BOT).unwrap().unwrap();
        assert!(cmd.needs_source_image());
        assert!(!parse("/sdxl_gen cat", BOT).unwrap().unwrap().needs_source_image());
    }
}
