// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable generation backend.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use metatron_core::{
    AdapterType, ChatRequest, GenerationBackend, HealthStatus, ImageFlavor, ImageRequest,
    MetatronError, MusicRequest, PluginAdapter,
};
use tokio::sync::Mutex;

/// Bytes returned for every generated image.
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Bytes returned for every generated track.
pub const FAKE_WAV: &[u8] = b"RIFF\0\0\0\0WAVEfake";

/// A call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Chat(ChatRequest),
    Images(ImageFlavor, ImageRequest),
    Music(MusicRequest),
}

/// A backend whose answers are queued up front by the test.
///
/// Chat calls pop scripted replies and fall back to `"mock reply"`.
/// Image calls return `batch_size` copies of [`FAKE_PNG`]. Queued errors
/// are returned by the next call of any kind.
pub struct MockBackend {
    replies: Mutex<VecDeque<String>>,
    errors: Mutex<VecDeque<MetatronError>>,
    calls: Mutex<Vec<BackendCall>>,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            errors: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_replies(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            ..Self::new()
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn push_reply(&self, reply: &str) {
        self.replies.lock().await.push_back(reply.to_string());
    }

    /// The next call of any kind fails with `error`.
    pub async fn fail_next(&self, error: MetatronError) {
        self.errors.lock().await.push_back(error);
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: BackendCall) -> Result<(), MetatronError> {
        self.calls.lock().await.push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.errors.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, MetatronError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MetatronError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn chat(&self, request: ChatRequest) -> Result<String, MetatronError> {
        self.record(BackendCall::Chat(request)).await?;
        Ok(self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock reply".to_string()))
    }

    async fn generate_images(
        &self,
        flavor: ImageFlavor,
        request: ImageRequest,
    ) -> Result<Vec<Vec<u8>>, MetatronError> {
        let batch = request.batch_size.max(1) as usize;
        self.record(BackendCall::Images(flavor, request)).await?;
        Ok(vec![FAKE_PNG.to_vec(); batch])
    }

    async fn generate_music(&self, request: MusicRequest) -> Result<Vec<u8>, MetatronError> {
        self.record(BackendCall::Music(request)).await?;
        Ok(FAKE_WAV.to_vec())
    }
}
