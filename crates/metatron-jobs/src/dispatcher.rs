// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The one submission path every surface goes through.

use metatron_core::{
    ActionKind, AdmissionKey, AttachmentKind, Identity, MetatronError, OutboundMessage,
    ReplyTarget,
};
use metatron_queue::{Denial, Scheduler};
use tracing::{info, warn};

use crate::actions::ActionPress;
use crate::context::JobContext;
use crate::generation::GenerationJob;
use crate::render;
use crate::spec::JobSpec;

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Queued { ahead: usize },
    Denied(Denial),
}

impl Submission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// Acknowledgement shown to the requester.
    pub fn notice(&self, spec: &JobSpec) -> String {
        match self {
            Self::Queued { ahead } => render::queued_ack(&spec.display_name(), *ahead),
            Self::Denied(_) => render::QUEUE_LIMIT_NOTICE.to_string(),
        }
    }
}

/// Cloneable front door to the queue.
///
/// Wraps the [`Scheduler`] with the job context so surfaces only deal in
/// [`JobSpec`]s.
#[derive(Clone)]
pub struct Dispatcher {
    scheduler: Scheduler,
    ctx: JobContext,
}

impl Dispatcher {
    pub fn new(scheduler: Scheduler, ctx: JobContext) -> Self {
        Self { scheduler, ctx }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn depth(&self) -> usize {
        self.scheduler.depth()
    }

    /// Validates `spec` and offers it to the queue.
    ///
    /// Invalid parameters are an error; a full queue or a banned requester
    /// is a [`Submission::Denied`].
    pub async fn submit(
        &self,
        owner: Identity,
        target: ReplyTarget,
        spec: JobSpec,
    ) -> Result<Submission, MetatronError> {
        spec.validate()?;
        let kind = spec.kind();
        let prompt = spec.prompt().unwrap_or_default().to_string();
        let job = GenerationJob::new(owner.clone(), target, spec, self.ctx.clone());
        match self.scheduler.submit(Box::new(job)).await {
            Ok(admitted) => {
                info!(identity = %owner, kind, prompt = %prompt, ahead = admitted.ahead, "request queued");
                Ok(Submission::Queued {
                    ahead: admitted.ahead,
                })
            }
            Err(denial) => Ok(Submission::Denied(denial)),
        }
    }

    /// Submits and sends the requester the usual acknowledgement.
    pub async fn submit_and_acknowledge(
        &self,
        owner: Identity,
        target: ReplyTarget,
        spec: JobSpec,
    ) -> Result<Submission, MetatronError> {
        let notice_spec = spec.clone();
        let submission = self.submit(owner, target.clone(), spec).await?;
        let notice = submission.notice(&notice_spec);
        if let Err(e) = self.ctx.channel.acknowledge(&target, &notice).await {
            warn!(chat_id = %target.chat_id, error = %e, "failed to acknowledge submission");
        }
        Ok(submission)
    }

    /// Flips the persisted ban flag for `id` and returns the new value.
    pub async fn toggle_ban(&self, id: &str) -> Result<bool, MetatronError> {
        let banned = self.ctx.store.toggle_ban(&AdmissionKey::from(id)).await?;
        info!(user = id, banned, "ban toggled");
        Ok(banned)
    }

    /// Handles a result button and returns the text to acknowledge it with.
    pub async fn press(&self, press: ActionPress) -> String {
        let Some(entry) = self.ctx.actions.get(&press.token) else {
            return render::EXPIRED_ACTION_NOTICE.to_string();
        };
        let is_owner = press.clicker.same_requester(&entry.owner);

        match press.kind {
            ActionKind::Reroll => {
                if !is_owner {
                    return "Only the original requester can reroll this.".to_string();
                }
                match self
                    .submit(entry.owner.clone(), entry.target.clone(), entry.spec.clone())
                    .await
                {
                    Ok(Submission::Queued { ahead }) => render::reroll_ack(ahead),
                    Ok(Submission::Denied(_)) => render::QUEUE_LIMIT_NOTICE.to_string(),
                    Err(e) => {
                        warn!(identity = %press.clicker, error = %e, "reroll rejected");
                        e.to_string()
                    }
                }
            }
            ActionKind::Mail => {
                let stem = render::mail_stem(&entry.prompt);
                let attachments = entry
                    .attachments
                    .iter()
                    .map(|a| {
                        let ext = a.filename.rsplit_once('.').map_or("bin", |(_, ext)| ext);
                        let mut copy = a.clone();
                        copy.filename = format!("{stem}.{ext}");
                        copy
                    })
                    .collect::<Vec<_>>();
                let noun = match attachments.first().map(|a| a.kind()) {
                    Some(AttachmentKind::Audio) => "audio",
                    _ => "image",
                };
                let msg = OutboundMessage {
                    target: Some(press.private_target.clone()),
                    content: entry.prompt.clone(),
                    attachments,
                    ..Default::default()
                };
                match self.ctx.channel.send(msg).await {
                    Ok(_) => info!(identity = %press.clicker, "result mailed"),
                    Err(e) => warn!(identity = %press.clicker, error = %e, "failed to mail result"),
                }
                format!("DM'ing {noun}...")
            }
            ActionKind::Delete => {
                if is_owner {
                    match self
                        .ctx
                        .channel
                        .delete_message(&press.target, &press.message)
                        .await
                    {
                        Ok(()) => {
                            self.ctx.actions.remove(&press.token);
                            info!(identity = %press.clicker, "result deleted");
                        }
                        Err(e) => {
                            warn!(identity = %press.clicker, error = %e, "failed to delete result")
                        }
                    }
                }
                "Image deleted.".to_string()
            }
        }
    }
}
