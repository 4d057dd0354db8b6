// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of job kinds a surface can request.

use metatron_core::{ImageFlavor, ImageRequest, MetatronError, MusicRequest};

/// Largest image batch the backend accepts in one call.
pub const MAX_BATCH_SIZE: u32 = 10;

/// Largest number of single generations bundled into one pack.
pub const MAX_PACK_REPEAT: u32 = 10;

/// Default image batch per flavour when the requester gives none.
pub fn default_batch_size(flavor: ImageFlavor) -> u32 {
    match flavor {
        ImageFlavor::Sdxl => 4,
        ImageFlavor::Flux | ImageFlavor::FluxEdit => 1,
    }
}

/// Parameters of an image generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub flavor: ImageFlavor,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub batch_size: u32,
    pub lora_name: Option<String>,
    /// Rewrite the prompt through the chat model before generating.
    pub enhance: bool,
    /// Required for [`ImageFlavor::FluxEdit`], ignored otherwise.
    pub source_image: Option<Vec<u8>>,
    /// Run the generation this many times and deliver the results together.
    pub repeat: u32,
}

impl ImageSpec {
    pub fn new(flavor: ImageFlavor, prompt: impl Into<String>) -> Self {
        Self {
            flavor,
            prompt: prompt.into(),
            negative_prompt: None,
            width: None,
            height: None,
            batch_size: default_batch_size(flavor),
            lora_name: None,
            enhance: false,
            source_image: None,
            repeat: 1,
        }
    }

    /// Backend request for one generation round using `prompt`.
    pub fn to_request(&self, prompt: &str) -> ImageRequest {
        let mut request = ImageRequest::new(prompt);
        request.negative_prompt = self.negative_prompt.clone();
        request.lora_name = self.lora_name.clone();
        request.width = self.width;
        request.height = self.height;
        request.batch_size = self.batch_size;
        request.source_image = self.source_image.clone();
        request
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicSpec {
    pub prompt: String,
    pub lyrics: String,
    pub duration_secs: u32,
}

impl MusicSpec {
    pub const DEFAULT_DURATION_SECS: u32 = 30;
    pub const INFER_STEPS: u32 = 120;

    pub fn to_request(&self) -> MusicRequest {
        MusicRequest {
            prompt: self.prompt.clone(),
            lyrics: self.lyrics.clone(),
            duration_secs: self.duration_secs,
            infer_steps: Self::INFER_STEPS,
        }
    }
}

/// Everything a queued job can do.
///
/// Each variant carries only the requester-supplied parameters. Models,
/// presets and history limits come from the job context at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSpec {
    /// Chat completion with the requester's bounded history.
    Chat { prompt: String },
    /// Empty the requester's chat history.
    ClearHistory,
    Image(ImageSpec),
    /// One card, or a pack of `count` cards delivered together.
    Card { prompt: String, count: u32 },
    Music(MusicSpec),
}

impl JobSpec {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::ClearHistory => "clear_history",
            Self::Image(spec) => match spec.flavor {
                ImageFlavor::Sdxl => "sdxl",
                ImageFlavor::Flux => "flux",
                ImageFlavor::FluxEdit => "flux_edit",
            },
            Self::Card { count, .. } if *count > 1 => "card_pack",
            Self::Card { .. } => "card",
            Self::Music(_) => "ace",
        }
    }

    /// Human-facing name used in acknowledgements and error reports.
    pub fn display_name(&self) -> String {
        match self {
            Self::Chat { .. } => "Chat".to_string(),
            Self::ClearHistory => "History Clear".to_string(),
            Self::Image(spec) => format!("{} Image", spec.flavor),
            Self::Card { count, .. } if *count > 1 => "Card Pack".to_string(),
            Self::Card { .. } => "Card".to_string(),
            Self::Music(_) => "Ace".to_string(),
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        match self {
            Self::Chat { prompt } | Self::Card { prompt, .. } => Some(prompt),
            Self::Image(spec) => Some(&spec.prompt),
            Self::Music(spec) => Some(&spec.prompt),
            Self::ClearHistory => None,
        }
    }

    /// Whether delivered results carry Reroll / Mail / Delete buttons.
    pub fn has_actions(&self) -> bool {
        matches!(self, Self::Image(_) | Self::Music(_))
    }

    /// Rejects parameters the backend would refuse anyway.
    pub fn validate(&self) -> Result<(), MetatronError> {
        if self.prompt().is_some_and(|p| p.trim().is_empty()) {
            return Err(MetatronError::InvalidRequest("prompt must not be empty".into()));
        }
        match self {
            Self::Image(spec) => {
                if spec.batch_size == 0 || spec.batch_size > MAX_BATCH_SIZE {
                    return Err(MetatronError::InvalidRequest(format!(
                        "batch_size must be between 1 and {MAX_BATCH_SIZE}"
                    )));
                }
                if spec.repeat == 0 || spec.repeat > MAX_PACK_REPEAT {
                    return Err(MetatronError::InvalidRequest(format!(
                        "pack size must be between 1 and {MAX_PACK_REPEAT}"
                    )));
                }
                if spec.flavor == ImageFlavor::FluxEdit && spec.source_image.is_none() {
                    return Err(MetatronError::InvalidRequest(
                        "image edits need a source image".into(),
                    ));
                }
                for (name, value) in [("width", spec.width), ("height", spec.height)] {
                    if value == Some(0) {
                        return Err(MetatronError::InvalidRequest(format!(
                            "{name} must be positive"
                        )));
                    }
                }
                Ok(())
            }
            Self::Card { count, .. } => {
                if *count == 0 || *count > MAX_PACK_REPEAT {
                    return Err(MetatronError::InvalidRequest(format!(
                        "card count must be between 1 and {MAX_PACK_REPEAT}"
                    )));
                }
                Ok(())
            }
            Self::Music(spec) if spec.duration_secs == 0 => Err(MetatronError::InvalidRequest(
                "duration must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}
