// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Avernus generation backend for Metatron.
//!
//! Implements [`GenerationBackend`] over the Avernus HTTP API: text chat,
//! SDXL / Flux image batches, prompt-guided image edits, and ACE music.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use metatron_config::model::AvernusConfig;
use metatron_core::{
    AdapterType, ChatRequest, GenerationBackend, HealthStatus, ImageFlavor, ImageRequest,
    MetatronError, MusicRequest, PluginAdapter,
};
use tracing::{debug, info};

use crate::client::AvernusClient;

/// [`GenerationBackend`] backed by an Avernus server.
pub struct AvernusBackend {
    client: AvernusClient,
}

impl AvernusBackend {
    pub fn new(config: &AvernusConfig) -> Result<Self, MetatronError> {
        let client = AvernusClient::new(
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(
            base_url = %client.base_url(),
            timeout_secs = config.timeout_secs,
            "avernus backend initialized"
        );
        Ok(Self { client })
    }

    pub fn from_client(client: AvernusClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PluginAdapter for AvernusBackend {
    fn name(&self) -> &str {
        "avernus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, MetatronError> {
        match self.client.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), MetatronError> {
        debug!("avernus backend shutting down");
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for AvernusBackend {
    async fn chat(&self, request: ChatRequest) -> Result<String, MetatronError> {
        self.client.llm_chat(&request).await
    }

    async fn generate_images(
        &self,
        flavor: ImageFlavor,
        request: ImageRequest,
    ) -> Result<Vec<Vec<u8>>, MetatronError> {
        self.client.images(flavor, &request).await
    }

    async fn generate_music(&self, request: MusicRequest) -> Result<Vec<u8>, MetatronError> {
        self.client.music(&request).await
    }
}
