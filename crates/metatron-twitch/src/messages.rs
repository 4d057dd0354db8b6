// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! EventSub websocket frames.
//!
//! Every frame is `{"metadata": {"message_type": ..}, "payload": {..}}`.
//! Only the frames the bridge acts on are decoded; the rest are kept as
//! [`Frame::Other`] so callers can log and move on.

use serde::Deserialize;

/// The subscription type for channel point redemptions.
pub const REDEMPTION_SUBSCRIPTION: &str = "channel.channel_points_custom_reward_redemption.add";

#[derive(Debug, Deserialize)]
struct Envelope {
    metadata: Metadata,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    message_type: String,
    #[serde(default)]
    subscription_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    session: Session,
}

#[derive(Debug, Deserialize)]
struct Session {
    id: String,
    #[serde(default)]
    reconnect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationPayload {
    event: Redemption,
}

/// One channel point redemption.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Redemption {
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    /// Text the viewer typed when redeeming; empty for rewards without input.
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub reward: Reward,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Reward {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First frame on a connection; subscriptions are bound to this session.
    Welcome { session_id: String },
    Keepalive,
    Redemption(Redemption),
    /// The server is moving us; connect to `url` to keep subscriptions.
    Reconnect { url: Option<String> },
    /// A subscription was revoked, usually because its token was.
    Revocation { subscription_type: Option<String> },
    Other(String),
}

/// Parses one text frame.
///
/// Malformed JSON and notification payloads that do not match their
/// declared type are errors.
pub fn parse_frame(text: &str) -> Result<Frame, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let frame = match envelope.metadata.message_type.as_str() {
        "session_welcome" => {
            let payload: SessionPayload = serde_json::from_value(envelope.payload)?;
            Frame::Welcome {
                session_id: payload.session.id,
            }
        }
        "session_keepalive" => Frame::Keepalive,
        "session_reconnect" => {
            let payload: SessionPayload = serde_json::from_value(envelope.payload)?;
            Frame::Reconnect {
                url: payload.session.reconnect_url,
            }
        }
        "notification"
            if envelope.metadata.subscription_type.as_deref()
                == Some(REDEMPTION_SUBSCRIPTION) =>
        {
            let payload: NotificationPayload = serde_json::from_value(envelope.payload)?;
            Frame::Redemption(payload.event)
        }
        "revocation" => Frame::Revocation {
            subscription_type: envelope.metadata.subscription_type,
        },
        other => Frame::Other(other.to_string()),
    };
    Ok(frame)
}
