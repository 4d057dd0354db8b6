// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queued job that runs a [`JobSpec`] against the backend.
//!
//! Every variant follows the same shape: build the backend request, call
//! the backend, turn the response into outbound messages, deliver them.
//! Backend failures are reported to the requester and logged here, so the
//! processor only ever sees a completed job.

use std::time::Instant;

use async_trait::async_trait;
use metatron_core::{
    Attachment, ChatRequest, HistoryEntry, Identity, MessageId, MetatronError, OutboundMessage,
    ReplyTarget,
};
use metatron_queue::Job;
use tracing::{error, info, warn};

use crate::actions::{ActionEntry, result_buttons};
use crate::cards::{CardRoll, build_card};
use crate::context::{JobContext, history_key};
use crate::render;
use crate::spec::{ImageSpec, JobSpec, MusicSpec};

pub struct GenerationJob {
    owner: Identity,
    target: ReplyTarget,
    spec: JobSpec,
    ctx: JobContext,
}

impl GenerationJob {
    pub fn new(owner: Identity, target: ReplyTarget, spec: JobSpec, ctx: JobContext) -> Self {
        Self {
            owner,
            target,
            spec,
            ctx,
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn target(&self) -> &ReplyTarget {
        &self.target
    }

    async fn run(&self) -> Result<(), MetatronError> {
        match &self.spec {
            JobSpec::Chat { prompt } => self.run_chat(prompt).await,
            JobSpec::ClearHistory => self.run_clear_history().await,
            JobSpec::Image(spec) => self.run_image(spec).await,
            JobSpec::Card { prompt, count } => self.run_cards(prompt, *count).await,
            JobSpec::Music(spec) => self.run_music(spec).await,
        }
    }

    async fn run_chat(&self, prompt: &str) -> Result<(), MetatronError> {
        let key = history_key(&self.owner);
        let history = match self.ctx.store.history(&key).await {
            Ok(history) => history,
            Err(e) => {
                warn!(identity = %self.owner, error = %e, "history unavailable, chatting without it");
                None
            }
        };

        let reply = self
            .ctx
            .backend
            .chat(ChatRequest {
                prompt: prompt.to_string(),
                model_name: self.ctx.settings.llm_model.clone(),
                messages: history,
            })
            .await?;

        let turns = vec![HistoryEntry::user(prompt), HistoryEntry::assistant(&reply)];
        if let Err(e) = self
            .ctx
            .store
            .append_history(&key, turns, self.ctx.settings.history_cap)
            .await
        {
            warn!(identity = %self.owner, error = %e, "failed to record chat history");
        }

        self.deliver(OutboundMessage::text(
            self.target.clone(),
            self.owner.mention(),
        ))
        .await;
        for chunk in render::chunk_text(&reply, render::CHUNK_CHARS) {
            self.deliver(OutboundMessage::text(self.target.clone(), chunk))
                .await;
        }
        Ok(())
    }

    async fn run_clear_history(&self) -> Result<(), MetatronError> {
        self.ctx.store.clear_history(&history_key(&self.owner)).await?;
        let text = render::history_cleared(self.owner.mention());
        if let Err(e) = self.ctx.channel.acknowledge(&self.target, &text).await {
            warn!(identity = %self.owner, error = %e, "failed to confirm history clear");
        }
        Ok(())
    }

    async fn run_image(&self, spec: &ImageSpec) -> Result<(), MetatronError> {
        let enhanced = if spec.enhance {
            let rewritten = self
                .ctx
                .backend
                .chat(ChatRequest {
                    prompt: self.ctx.settings.enhancement_request(&spec.prompt),
                    model_name: self.ctx.settings.llm_model.clone(),
                    messages: None,
                })
                .await?;
            Some(rewritten.trim().to_string())
        } else {
            None
        };
        let prompt = enhanced.as_deref().unwrap_or(&spec.prompt);

        let mut images = Vec::new();
        for _ in 0..spec.repeat {
            let batch = self
                .ctx
                .backend
                .generate_images(spec.flavor, spec.to_request(prompt))
                .await?;
            images.extend(batch);
        }

        let stem = render::attachment_stem(&spec.prompt);
        let attachments = images
            .into_iter()
            .map(|data| Attachment::png(format!("{stem}.png"), data))
            .collect();
        let caption = render::image_caption(
            spec.flavor,
            self.owner.mention(),
            &spec.prompt,
            enhanced.as_deref(),
            spec.repeat,
        );
        self.deliver_result(caption, attachments).await;
        Ok(())
    }

    async fn run_music(&self, spec: &MusicSpec) -> Result<(), MetatronError> {
        let started = Instant::now();
        let audio = self.ctx.backend.generate_music(spec.to_request()).await?;
        let attachment = Attachment {
            filename: format!("{}.wav", render::attachment_stem(&spec.prompt)),
            mime_type: "audio/wav".to_string(),
            data: audio,
        };
        let caption = render::music_caption(self.owner.mention(), &spec.prompt, started.elapsed());
        self.deliver_result(caption, vec![attachment]).await;
        Ok(())
    }

    async fn run_cards(&self, prompt: &str, count: u32) -> Result<(), MetatronError> {
        let mut cards = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let roll = CardRoll::random();
            cards.push(build_card(&self.ctx, prompt, &self.target.chat_id, roll).await?);
        }

        let content = if cards.len() == 1 {
            cards[0].caption()
        } else {
            let listing: Vec<String> = cards
                .iter()
                .enumerate()
                .map(|(i, card)| format!("{}. {}", i + 1, card.caption()))
                .collect();
            format!(
                "{}\n\n{}",
                render::pack_caption(self.owner.mention()),
                listing.join("\n\n")
            )
        };
        let stem = render::attachment_stem(prompt);
        let attachments = cards
            .into_iter()
            .enumerate()
            .map(|(i, card)| Attachment::png(format!("{stem}.card{}.png", i + 1), card.art))
            .collect();

        self.deliver(OutboundMessage {
            target: Some(self.target.clone()),
            content,
            attachments,
            actions: Vec::new(),
            spoiler: true,
        })
        .await;
        Ok(())
    }

    /// Sends a generated result with Reroll / Mail / Delete buttons when the
    /// surface supports them.
    async fn deliver_result(&self, caption: String, attachments: Vec<Attachment>) {
        let actions = if self.ctx.channel.capabilities().supports_buttons && self.spec.has_actions()
        {
            let token = self.ctx.actions.register(ActionEntry {
                owner: self.owner.clone(),
                target: self.target.clone(),
                spec: self.spec.clone(),
                prompt: self.spec.prompt().unwrap_or_default().to_string(),
                attachments: attachments.clone(),
            });
            result_buttons(&token)
        } else {
            Vec::new()
        };
        self.deliver(OutboundMessage {
            target: Some(self.target.clone()),
            content: caption,
            attachments,
            actions,
            spoiler: false,
        })
        .await;
    }

    /// Sends one message. Delivery failures end here.
    async fn deliver(&self, msg: OutboundMessage) -> Option<MessageId> {
        match self.ctx.channel.send(msg).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(
                    identity = %self.owner,
                    kind = self.spec.kind(),
                    chat_id = %self.target.chat_id,
                    error = %e,
                    "failed to deliver result"
                );
                None
            }
        }
    }

    async fn report_failure(&self, err: &MetatronError) {
        let text = render::error_report(
            self.owner.mention(),
            &self.spec.display_name(),
            self.spec.prompt(),
            err,
        );
        self.deliver(OutboundMessage::text(self.target.clone(), text))
            .await;
    }
}

#[async_trait]
impl Job for GenerationJob {
    fn owner(&self) -> &Identity {
        &self.owner
    }

    fn kind(&self) -> &str {
        self.spec.kind()
    }

    fn summary(&self) -> String {
        self.spec
            .prompt()
            .map(|p| p.chars().take(80).collect())
            .unwrap_or_default()
    }

    async fn execute(self: Box<Self>) -> Result<(), MetatronError> {
        let started = Instant::now();
        match self.run().await {
            Ok(()) => info!(
                identity = %self.owner,
                kind = self.spec.kind(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "generation succeeded"
            ),
            Err(e) => {
                error!(
                    identity = %self.owner,
                    kind = self.spec.kind(),
                    prompt = self.spec.prompt().unwrap_or_default(),
                    error = %e,
                    "generation failed"
                );
                self.report_failure(&e).await;
            }
        }
        Ok(())
    }
}
