// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Twitch channel point bridge for the Metatron generation bot.
//!
//! Listens on the EventSub websocket and turns every reward redemption
//! into a card pack job for the redeeming viewer. Redemptions go through
//! the same admission path as chat commands, under an external identity.

pub mod auth;
pub mod messages;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metatron_config::model::TwitchConfig;
use metatron_core::{Identity, MetatronError, ReplyTarget};
use metatron_jobs::spec::JobSpec;
use metatron_jobs::{Dispatcher, Submission};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::TwitchAuth;
use crate::messages::{Frame, Redemption, parse_frame};

pub const SOURCE: &str = "twitch";

/// Why a websocket session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    Closed,
    TokenRefreshed,
    /// Twitch asked us to move; subscriptions carry over.
    Moved(String),
}

/// Wires redemptions from one broadcaster into the shared dispatcher.
pub struct TwitchBridge {
    config: TwitchConfig,
    auth: Arc<TwitchAuth>,
    dispatcher: Dispatcher,
    target: ReplyTarget,
    pack_size: u32,
}

impl TwitchBridge {
    /// `channel` names the surface that receives card packs.
    pub fn new(
        config: TwitchConfig,
        dispatcher: Dispatcher,
        channel: &str,
    ) -> Result<Self, MetatronError> {
        let auth = TwitchAuth::from_config(&config)?;
        let chat_id = config
            .reward_chat_id
            .clone()
            .ok_or_else(|| MetatronError::Config("twitch.reward_chat_id is required".into()))?;
        let pack_size = dispatcher.context().settings.card_pack_size;
        Ok(Self {
            target: ReplyTarget::new(channel, chat_id),
            config,
            auth: Arc::new(auth),
            dispatcher,
            pack_size,
        })
    }

    pub fn auth(&self) -> &Arc<TwitchAuth> {
        &self.auth
    }

    /// Queues a card pack for a redemption.
    ///
    /// Rewards without viewer input use the reward title as the prompt.
    pub async fn redeem(&self, redemption: &Redemption) -> Result<Submission, MetatronError> {
        let owner = Identity::external(SOURCE, &redemption.user_login);
        let prompt = match redemption.user_input.trim() {
            "" => redemption.reward.title.trim().to_string(),
            input => input.to_string(),
        };
        info!(
            user = %redemption.user_login,
            reward = %redemption.reward.title,
            prompt = %prompt,
            "card redemption"
        );
        let spec = JobSpec::Card {
            prompt,
            count: self.pack_size,
        };
        let submission = self
            .dispatcher
            .submit(owner, self.target.clone(), spec)
            .await?;
        if let Submission::Denied(denial) = &submission {
            warn!(user = %redemption.user_login, ?denial, "redemption not queued");
        }
        Ok(submission)
    }

    /// Runs the listener and the token expiry check until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let expiry = tokio::spawn(self.clone().check_expiry(cancel.clone()));
        self.listen(cancel).await;
        if let Err(e) = expiry.await {
            error!(error = %e, "token expiry task failed");
        }
    }

    async fn check_expiry(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.token_check_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.auth.refresh_if_expired().await {
                        warn!(error = %e, "token expiry check failed");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("token expiry task shutting down");
                    break;
                }
            }
        }
    }

    /// Keeps a session open, reconnecting after errors and token refreshes.
    pub async fn listen(&self, cancel: CancellationToken) {
        let delay = Duration::from_secs(self.config.reconnect_delay_secs);
        let mut url = self.config.eventsub_url.clone();
        let mut resumed = false;
        loop {
            let end = self.session(&url, resumed, &cancel).await;
            resumed = false;
            match end {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::Moved(next)) => {
                    info!(url = %next, "twitch session moving");
                    url = next;
                    resumed = true;
                    continue;
                }
                Ok(SessionEnd::TokenRefreshed) => info!("twitch reconnecting after token refresh"),
                Ok(SessionEnd::Closed) => info!("twitch connection closed, reconnecting"),
                Err(e) => warn!(error = %e, "twitch error, reconnecting"),
            }
            url = self.config.eventsub_url.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }
        info!("twitch listener stopped");
    }

    async fn session(
        &self,
        url: &str,
        resumed: bool,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, MetatronError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| MetatronError::Channel {
                message: format!("failed to connect to {url}: {e}"),
                source: Some(Box::new(e)),
            })?;
        info!("twitch login success");
        let refreshed = self.auth.refreshed();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                _ = refreshed.notified() => return Ok(SessionEnd::TokenRefreshed),
                next = ws.next() => next,
            };
            let text = match next {
                None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(MetatronError::Channel {
                        message: format!("websocket receive error: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            };
            match parse_frame(text.as_str()) {
                Ok(Frame::Welcome { session_id }) if resumed => {
                    debug!(session_id = %session_id, "resumed session keeps subscriptions");
                }
                Ok(Frame::Welcome { session_id }) => {
                    match self.auth.subscribe_or_refresh(&session_id).await {
                        Ok(true) => {}
                        Ok(false) => warn!("subscription failed after token refresh"),
                        Err(e) => warn!(error = %e, "subscription failed"),
                    }
                }
                Ok(Frame::Redemption(redemption)) => {
                    if let Err(e) = self.redeem(&redemption).await {
                        warn!(user = %redemption.user_login, error = %e, "redemption rejected");
                    }
                }
                Ok(Frame::Reconnect { url: Some(next) }) => return Ok(SessionEnd::Moved(next)),
                Ok(Frame::Reconnect { url: None }) => return Ok(SessionEnd::Closed),
                Ok(Frame::Revocation { subscription_type }) => {
                    warn!(?subscription_type, "subscription revoked");
                }
                Ok(Frame::Keepalive) => {}
                Ok(Frame::Other(kind)) => debug!(kind = %kind, "ignoring eventsub frame"),
                Err(e) => warn!(error = %e, "malformed eventsub frame"),
            }
        }
    }
}
