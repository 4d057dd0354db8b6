// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parody trading-card generation.
//!
//! A card is rolled locally (type, colour, art style), named and flavoured
//! by the card model, then illustrated with one SDXL image. Compositing the
//! frame is left to the reader's imagination: the art is delivered with a
//! caption carrying the card text.

use metatron_core::{ChatRequest, ImageFlavor, ImageRequest, MetatronError};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::context::JobContext;

const MAX_TITLE_CHARS: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Creature,
    Land,
    Instant,
    Sorcery,
    Artifact,
    Enchantment,
}

impl CardType {
    const ALL: [CardType; 6] = [
        CardType::Creature,
        CardType::Land,
        CardType::Instant,
        CardType::Sorcery,
        CardType::Artifact,
        CardType::Enchantment,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Creature => "Creature",
            Self::Land => "Land",
            Self::Instant => "Instant",
            Self::Sorcery => "Sorcery",
            Self::Artifact => "Artifact",
            Self::Enchantment => "Enchantment",
        }
    }

    /// Word used when asking the card model for text.
    fn prompt_word(self) -> &'static str {
        match self {
            Self::Instant | Self::Sorcery => "spell",
            other => other.label(),
        }
    }

    fn colors(self) -> &'static [CardColor] {
        use CardColor::*;
        match self {
            Self::Creature => &[White, Blue, Black, Red, Green, Gold, Colorless],
            Self::Land => &[White, Blue, Black, Red, Green, Colorless],
            Self::Artifact => &[Colorless],
            Self::Instant | Self::Sorcery | Self::Enchantment => &[White, Blue, Black, Red, Green],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardColor {
    White,
    Blue,
    Black,
    Red,
    Green,
    Gold,
    Colorless,
}

impl CardColor {
    pub fn label(self) -> &'static str {
        match self {
            Self::White => "White",
            Self::Blue => "Blue",
            Self::Black => "Black",
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Gold => "Gold",
            Self::Colorless => "Colorless",
        }
    }

    fn terrain(self) -> &'static str {
        match self {
            Self::White => "field of plains",
            Self::Blue => "shore",
            Self::Black => "swamp",
            Self::Red => "mountains",
            Self::Green => "forest",
            Self::Gold | Self::Colorless => "artifact structure",
        }
    }
}

const ART_STYLES: &[&str] = &[
    "oil painting with heavy brush strokes",
    "detailed pen and ink illustration",
    "soft watercolor fantasy art",
    "dramatic high fantasy concept art",
    "vintage pulp magazine cover art",
    "muted gouache storybook illustration",
    "bold woodcut print",
    "airbrushed 1980s fantasy art",
];

/// The locally random part of a card, rolled before any backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRoll {
    pub card_type: CardType,
    pub color: CardColor,
    pub style: &'static str,
    pub legendary: bool,
    pub mana: u8,
}

impl CardRoll {
    pub fn random() -> Self {
        Self::with_rng(&mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let card_type = *CardType::ALL.choose(rng).unwrap_or(&CardType::Creature);
        let color = *card_type.colors().choose(rng).unwrap_or(&CardColor::Colorless);
        let style = ART_STYLES.choose(rng).copied().unwrap_or(ART_STYLES[0]);
        Self {
            card_type,
            color,
            style,
            legendary: rng.gen_range(0..10) == 0,
            mana: rng.gen_range(1..=5),
        }
    }

    pub fn type_line(&self) -> String {
        let legendary = if self.legendary { "Legendary " } else { "" };
        match self.color {
            CardColor::Colorless => format!("{legendary}{}", self.card_type.label()),
            color => format!("{legendary}{} {}", color.label(), self.card_type.label()),
        }
    }

    /// Art prompt for this roll.
    pub fn art_prompt(&self, prompt: &str, title: &str) -> String {
        let style = self.style;
        match self.card_type {
            CardType::Creature => format!("{prompt}. {style}. {title}."),
            CardType::Land => format!("{prompt} {}. {style}.", self.color.terrain()),
            CardType::Artifact => format!("{prompt} artifact. {style}. {title}."),
            CardType::Instant | CardType::Sorcery | CardType::Enchantment => {
                format!("casting spell {prompt}. {style}. {title}.")
            }
        }
    }
}

/// A finished card.
#[derive(Debug, Clone)]
pub struct Card {
    pub title: String,
    pub type_line: String,
    pub flavor: String,
    pub style: String,
    pub mana: u8,
    pub art: Vec<u8>,
}

impl Card {
    pub fn caption(&self) -> String {
        format!(
            "{} ({} mana)\n{}\n{}\nIllus. {}",
            self.title, self.mana, self.type_line, self.flavor, self.style
        )
    }
}

/// Cleans a model-written title: first line, no quotes, at most 25 characters.
pub fn clean_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let title: String = line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '*'))
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let title = title.trim().to_string();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

/// Builds one card for `prompt`, requested from the chat `chat_id`.
pub async fn build_card(
    ctx: &JobContext,
    prompt: &str,
    chat_id: &str,
    roll: CardRoll,
) -> Result<Card, MetatronError> {
    let word = roll.card_type.prompt_word();
    let model = ctx.settings.card_model();

    let title = ctx
        .backend
        .chat(ChatRequest {
            prompt: format!(
                "Create a new random Magic The Gathering {word} card title based on {prompt}. \
                 You respond with ONLY the title and it cannot be longer than 25 characters"
            ),
            model_name: model.clone(),
            messages: None,
        })
        .await?;
    let title = clean_title(&title);

    let flavor = ctx
        .backend
        .chat(ChatRequest {
            prompt: format!(
                "Create a new random Magic The Gathering {word} card flavor text based on {prompt}. \
                 You respond with ONLY one sentence of flavor text."
            ),
            model_name: model,
            messages: None,
        })
        .await?;

    let mut art_prompt = roll.art_prompt(prompt, &title);
    let mut request = ImageRequest::new("");
    if let Some(preset) = ctx.settings.lora_for(chat_id) {
        art_prompt = format!("{}{art_prompt}", preset.prompt_prefix);
        request.lora_name = Some(preset.lora_name.clone());
    }
    request.prompt = art_prompt;
    request.batch_size = 1;

    debug!(title = %title, card_type = roll.card_type.label(), "card text generated");
    let art = ctx
        .backend
        .generate_images(ImageFlavor::Sdxl, request)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| MetatronError::backend("backend returned no card art"))?;

    Ok(Card {
        title,
        type_line: roll.type_line(),
        flavor: flavor.trim().to_string(),
        style: roll.style.to_string(),
        mana: roll.mana,
        art,
    })
}
