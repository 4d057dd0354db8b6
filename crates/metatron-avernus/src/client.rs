// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Avernus API.
//!
//! One POST per generation call. Transient gateway statuses (429, 502, 503)
//! are retried once; everything else is surfaced as a backend error so the
//! job can report it.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use metatron_core::{ChatRequest, ImageFlavor, ImageRequest, MetatronError, MusicRequest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{ChatReply, DEFAULT_DIMENSION, ImageBody, LlmChatBody, MusicBody};

/// Path of the image endpoint for each flavor.
pub fn image_endpoint(flavor: ImageFlavor) -> &'static str {
    match flavor {
        ImageFlavor::Sdxl => "/sdxl_generate",
        ImageFlavor::Flux => "/flux_generate",
        ImageFlavor::FluxEdit => "/flux_edit_generate",
    }
}

#[derive(Debug, Clone)]
pub struct AvernusClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl AvernusClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MetatronError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetatronError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shortens the retry pause (tests).
    #[cfg(test)]
    pub(crate) fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn llm_chat(&self, request: &ChatRequest) -> Result<String, MetatronError> {
        let body = LlmChatBody {
            prompt: &request.prompt,
            model_name: request.model_name.as_deref(),
            messages: request.messages.as_deref(),
        };
        let response = self.post("/llm_chat", &body).await?;
        let reply: ChatReply = response.json().await.map_err(|e| MetatronError::Backend {
            message: format!("malformed chat response: {e}"),
            source: Some(Box::new(e)),
        })?;
        match reply {
            ChatReply::Text(text) | ChatReply::Wrapped { response: text } => Ok(text),
            ChatReply::Error { error } => Err(MetatronError::backend(error)),
        }
    }

    pub async fn images(
        &self,
        flavor: ImageFlavor,
        request: &ImageRequest,
    ) -> Result<Vec<Vec<u8>>, MetatronError> {
        let body = ImageBody {
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref(),
            model_name: request.model_name.as_deref(),
            lora_name: request.lora_name.as_deref(),
            width: request.width.unwrap_or(DEFAULT_DIMENSION),
            height: request.height.unwrap_or(DEFAULT_DIMENSION),
            steps: request.steps,
            batch_size: request.batch_size,
            image: request.source_image.as_ref().map(|bytes| STANDARD.encode(bytes)),
        };
        let response = self.post(image_endpoint(flavor), &body).await?;
        let encoded: Vec<String> = response.json().await.map_err(|e| MetatronError::Backend {
            message: format!("malformed image response: {e}"),
            source: Some(Box::new(e)),
        })?;
        if encoded.is_empty() {
            return Err(MetatronError::backend("backend returned no images"));
        }
        encoded
            .iter()
            .map(|image| {
                STANDARD.decode(image).map_err(|e| MetatronError::Backend {
                    message: format!("image payload is not valid base64: {e}"),
                    source: Some(Box::new(e)),
                })
            })
            .collect()
    }

    pub async fn music(&self, request: &MusicRequest) -> Result<Vec<u8>, MetatronError> {
        let body = MusicBody {
            prompt: &request.prompt,
            lyrics: &request.lyrics,
            audio_duration: request.duration_secs,
            infer_step: request.infer_steps,
        };
        let response = self.post("/ace_generate", &body).await?;
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        if bytes.is_empty() {
            return Err(MetatronError::backend("backend returned an empty audio track"));
        }
        Ok(bytes.to_vec())
    }

    /// Liveness check against the server root.
    pub async fn ping(&self) -> Result<(), MetatronError> {
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| self.transport_error(e))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<reqwest::Response, MetatronError> {
        let url = format!("{}{endpoint}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(endpoint, attempt, "retrying backend request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            debug!(endpoint, status = %status, attempt, "backend response received");
            if status.is_success() {
                return Ok(response);
            }

            let text = response.text().await.unwrap_or_default();
            let error = MetatronError::backend(format!("{endpoint} returned {status}: {text}"));
            if is_transient(status) && attempt < self.max_retries {
                warn!(endpoint, status = %status, "transient backend error, will retry");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| MetatronError::backend("request failed after retries")))
    }

    fn transport_error(&self, e: reqwest::Error) -> MetatronError {
        if e.is_timeout() {
            MetatronError::Timeout {
                duration: self.timeout,
            }
        } else {
            MetatronError::Backend {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

fn is_transient(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metatron_core::HistoryEntry;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AvernusClient {
        AvernusClient::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn chat_sends_history_and_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/llm_chat"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "hello",
                "model_name": "qwen",
                "messages": [{"role": "user", "content": "earlier"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json("hi there"))
            .mount(&server)
            .await;

        let request = ChatRequest {
            prompt: "hello".into(),
            model_name: Some("qwen".into()),
            messages: Some(vec![HistoryEntry::user("earlier")]),
        };
        assert_eq!(client(&server).llm_chat(&request).await.unwrap(), "hi there");
    }

    #[tokio::test]
    async fn chat_error_object_becomes_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/llm_chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ERROR": "model not loaded"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .llm_chat(&ChatRequest {
                prompt: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"), "got: {err}");
    }

    #[tokio::test]
    async fn images_are_base64_decoded() {
        let server = MockServer::start().await;
        let encoded = vec![STANDARD.encode(b"png-one"), STANDARD.encode(b"png-two")];
        Mock::given(method("POST"))
            .and(path("/sdxl_generate"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "a castle",
                "width": 1024,
                "height": 768,
                "steps": 30,
                "batch_size": 2,
                "lora_name": "castles"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&encoded))
            .mount(&server)
            .await;

        let mut request = ImageRequest::new("a castle");
        request.height = Some(768);
        request.batch_size = 2;
        request.lora_name = Some("castles".into());
        let images = client(&server)
            .images(ImageFlavor::Sdxl, &request)
            .await
            .unwrap();
        assert_eq!(images, vec![b"png-one".to_vec(), b"png-two".to_vec()]);
    }

    #[tokio::test]
    async fn edit_sends_encoded_source_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flux_edit_generate"))
            .and(body_partial_json(serde_json::json!({
                "image": STANDARD.encode(b"source")
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![STANDARD.encode(b"out")]))
            .mount(&server)
            .await;

        let mut request = ImageRequest::new("make it blue");
        request.source_image = Some(b"source".to_vec());
        let images = client(&server)
            .images(ImageFlavor::FluxEdit, &request)
            .await
            .unwrap();
        assert_eq!(images[0], b"out");
    }

    #[tokio::test]
    async fn music_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ace_generate"))
            .and(body_partial_json(serde_json::json!({
                "audio_duration": 30,
                "infer_step": 120
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFFdata".to_vec()))
            .mount(&server)
            .await;

        let track = client(&server)
            .music(&MusicRequest {
                prompt: "lofi".into(),
                lyrics: "[inst]".into(),
                duration_secs: 30,
                infer_steps: 120,
            })
            .await
            .unwrap();
        assert_eq!(track, b"RIFFdata");
    }

    #[tokio::test]
    async fn transient_status_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flux_generate"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/flux_generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![STANDARD.encode(b"ok")]))
            .mount(&server)
            .await;

        let images = client(&server)
            .images(ImageFlavor::Flux, &ImageRequest::new("x"))
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sdxl_generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .images(ImageFlavor::Sdxl, &ImageRequest::new("x"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("500"), "got: {message}");
        assert!(message.contains("CUDA out of memory"), "got: {message}");
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/llm_chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json("late")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = AvernusClient::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client
            .llm_chat(&ChatRequest {
                prompt: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MetatronError::Timeout { .. }), "got: {err:?}");
    }
}
