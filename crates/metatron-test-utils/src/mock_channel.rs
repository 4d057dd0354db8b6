// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter capturing everything a job delivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metatron_core::{
    AdapterType, ChannelAdapter, ChannelCapabilities, HealthStatus, MessageId, MetatronError,
    OutboundMessage, PluginAdapter, ReplyTarget,
};
use tokio::sync::{Mutex, Notify};

/// A chat surface that records sends, acknowledgements, and deletions.
pub struct MockChannel {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    acks: Arc<Mutex<Vec<(ReplyTarget, String)>>>,
    deleted: Arc<Mutex<Vec<(ReplyTarget, MessageId)>>>,
    fail_sends: AtomicBool,
    next_id: AtomicU64,
    notify: Arc<Notify>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            acks: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            fail_sends: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Makes every following `send()` fail with a channel error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn acknowledgements(&self) -> Vec<(ReplyTarget, String)> {
        self.acks.lock().await.clone()
    }

    pub async fn deleted(&self) -> Vec<(ReplyTarget, MessageId)> {
        self.deleted.lock().await.clone()
    }

    /// Waits until at least `count` messages were sent, or panics after `timeout`.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<OutboundMessage> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                {
                    let sent = self.sent.lock().await;
                    if sent.len() >= count {
                        return sent.clone();
                    }
                }
                notified.await;
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(sent) => sent,
            Err(_) => panic!(
                "expected {count} sent messages, got {}",
                self.sent.lock().await.len()
            ),
        }
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, MetatronError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MetatronError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_buttons: true,
            supports_attachments: true,
            supports_ephemeral: true,
            max_message_length: Some(4096),
            ack_ttl: None,
        }
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, MetatronError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MetatronError::channel("mock send failure"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push(msg);
        self.notify.notify_waiters();
        Ok(MessageId(format!("mock-msg-{id}")))
    }

    async fn acknowledge(&self, target: &ReplyTarget, text: &str) -> Result<(), MetatronError> {
        self.acks
            .lock()
            .await
            .push((target.clone(), text.to_string()));
        Ok(())
    }

    async fn delete_message(
        &self,
        target: &ReplyTarget,
        message_id: &MessageId,
    ) -> Result<(), MetatronError> {
        self.deleted
            .lock()
            .await
            .push((target.clone(), message_id.clone()));
        Ok(())
    }
}
