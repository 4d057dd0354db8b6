// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token storage, refresh, and EventSub subscription.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metatron_config::model::TwitchConfig;
use metatron_core::MetatronError;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::messages::REDEMPTION_SUBSCRIPTION;

/// The JSON document holding the broadcaster's tokens.
///
/// Unknown keys are preserved across rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFile {
    pub channel_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which `channel_token` stops working.
    #[serde(default)]
    pub token_expires_at: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenFile {
    pub async fn load(path: &Path) -> Result<Self, MetatronError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(MetatronError::storage)?;
        serde_json::from_str(&raw).map_err(MetatronError::storage)
    }

    pub async fn save(&self, path: &Path) -> Result<(), MetatronError> {
        let json = serde_json::to_string_pretty(self).map_err(MetatronError::storage)?;
        tokio::fs::write(path, json)
            .await
            .map_err(MetatronError::storage)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.token_expires_at
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

fn http_error(context: &str, e: reqwest::Error) -> MetatronError {
    MetatronError::Channel {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Talks to the Twitch OAuth and Helix endpoints.
///
/// A successful refresh wakes whoever waits on [`TwitchAuth::refreshed`],
/// so the listener can reconnect with the new token.
pub struct TwitchAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    channel_id: String,
    token_file: PathBuf,
    helix_url: String,
    oauth_url: String,
    refreshed: Arc<Notify>,
    refresh_lock: Mutex<()>,
}

impl TwitchAuth {
    pub fn from_config(config: &TwitchConfig) -> Result<Self, MetatronError> {
        let required = |name: &str, value: &Option<String>| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| MetatronError::Config(format!("twitch.{name} is required")))
        };
        Ok(Self {
            http: reqwest::Client::new(),
            client_id: required("client_id", &config.client_id)?,
            client_secret: required("client_secret", &config.client_secret)?,
            channel_id: required("channel_id", &config.channel_id)?,
            token_file: PathBuf::from(&config.token_file),
            helix_url: config.helix_url.trim_end_matches('/').to_string(),
            oauth_url: config.oauth_url.clone(),
            refreshed: Arc::new(Notify::new()),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn refreshed(&self) -> Arc<Notify> {
        self.refreshed.clone()
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// Exchanges the stored refresh token for a new pair and persists it.
    pub async fn refresh(&self) -> Result<TokenFile, MetatronError> {
        let _guard = self.refresh_lock.lock().await;
        let mut tokens = TokenFile::load(&self.token_file).await?;

        let response = self
            .http
            .post(&self.oauth_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", tokens.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| http_error("token refresh failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "failed to refresh access token");
            return Err(MetatronError::channel(format!(
                "token refresh returned {status}"
            )));
        }
        let fresh: RefreshResponse = response
            .json()
            .await
            .map_err(|e| http_error("malformed token refresh response", e))?;

        tokens.channel_token = fresh.access_token;
        tokens.refresh_token = fresh.refresh_token;
        tokens.token_expires_at = chrono::Utc::now().timestamp() + fresh.expires_in;
        tokens.save(&self.token_file).await?;
        info!(expires_at = tokens.token_expires_at, "access token refreshed");

        self.refreshed.notify_one();
        Ok(tokens)
    }

    /// Refreshes when the stored token has expired. Returns whether it did.
    pub async fn refresh_if_expired(&self) -> Result<bool, MetatronError> {
        let tokens = TokenFile::load(&self.token_file).await?;
        if !tokens.is_expired(chrono::Utc::now().timestamp()) {
            return Ok(false);
        }
        info!("access token expired, refreshing");
        self.refresh().await?;
        Ok(true)
    }

    /// Subscribes `session_id` to redemptions. `Ok(false)` when Twitch
    /// answers anything but 202 Accepted.
    pub async fn subscribe(&self, session_id: &str) -> Result<bool, MetatronError> {
        let tokens = TokenFile::load(&self.token_file).await?;
        let body = serde_json::json!({
            "type": REDEMPTION_SUBSCRIPTION,
            "version": "1",
            "condition": { "broadcaster_user_id": self.channel_id },
            "transport": { "method": "websocket", "session_id": session_id },
        });
        let response = self
            .http
            .post(format!("{}/eventsub/subscriptions", self.helix_url))
            .bearer_auth(&tokens.channel_token)
            .header("Client-Id", &self.client_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error("subscription request failed", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::ACCEPTED {
            info!(session_id, "subscribed to channel point redemptions");
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "failed to subscribe");
        Ok(false)
    }

    /// Subscribes, refreshing the tokens and retrying once on failure.
    pub async fn subscribe_or_refresh(&self, session_id: &str) -> Result<bool, MetatronError> {
        if self.subscribe(session_id).await? {
            return Ok(true);
        }
        debug!("refreshing tokens before retrying subscription");
        self.refresh().await?;
        self.subscribe(session_id).await
    }
}
