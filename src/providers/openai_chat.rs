//! OpenAI-compatible chat-completions client
//!
//! One client type serves all three chat endpoints: the RAG backend (Groq),
//! the general backend (NVIDIA NIM), and the vision model used for image
//! transcription during ingestion.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::{ModelEndpoint, RetryConfig};
use crate::error::{Error, Result};

use super::chat::{ChatMessage, ChatProvider, VisionExtractor};
use super::retry::{with_retries, CallError};

/// Instruction sent with image bytes for transcription
const VISION_INSTRUCTION: &str = "Transcribe all text, tables, and charts from this page into \
clear Markdown. If there are tables, represent them as Markdown tables.";

/// Client for one OpenAI-compatible `/chat/completions` endpoint
pub struct ChatCompletionsClient {
    client: Client,
    config: ModelEndpoint,
    retry: RetryConfig,
}

#[derive(Deserialize)]
struct CompletionsResponse {
    choices: Vec<CompletionsChoice>,
}

#[derive(Deserialize)]
struct CompletionsChoice {
    message: CompletionsMessage,
}

#[derive(Deserialize)]
struct CompletionsMessage {
    content: String,
}

impl ChatCompletionsClient {
    /// Create a new client from an endpoint config and retry policy
    pub fn new(config: &ModelEndpoint, retry: &RetryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config: config.clone(),
            retry: retry.clone(),
        }
    }

    /// Post a chat completion. Messages are passed as JSON so callers can
    /// use plain text content or multimodal content parts.
    async fn post_completion(&self, messages: serde_json::Value) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": false,
        });
        let api_key = self.config.api_key.clone();
        let client = self.client.clone();

        let result = with_retries(&self.retry, "chat completion", || {
            let url = url.clone();
            let body = body.clone();
            let api_key = api_key.clone();
            let client = client.clone();

            async move {
                let mut request = client.post(&url).json(&body);
                if !api_key.is_empty() {
                    request = request.bearer_auth(&api_key);
                }

                let response = request.send().await.map_err(CallError::transport)?;

                let status = response.status();
                if status.is_server_error() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(CallError::Transient(format!("HTTP {} - {}", status, text)));
                }
                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(CallError::Permanent(Error::generation(format!(
                        "HTTP {} - {}",
                        status, text
                    ))));
                }

                let parsed: CompletionsResponse = response.json().await.map_err(|e| {
                    CallError::Permanent(Error::generation(format!(
                        "Failed to parse completion response: {}",
                        e
                    )))
                })?;

                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| {
                        CallError::Permanent(Error::generation("Completion returned no choices"))
                    })
            }
        })
        .await;

        match result {
            Ok(content) => Ok(content),
            Err(CallError::Permanent(e)) => Err(e),
            Err(CallError::Transient(message)) => Err(Error::generation(message)),
        }
    }
}

#[async_trait]
impl ChatProvider for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        tracing::debug!("Generating with model {}", self.config.model);
        self.post_completion(serde_json::to_value(messages)?).await
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn name(&self) -> &str {
        "chat-completions"
    }
}

#[async_trait]
impl VisionExtractor for ChatCompletionsClient {
    async fn transcribe_image(&self, image: &[u8], mime: &str) -> Result<String> {
        let data_url = format!("data:{};base64,{}", mime, BASE64.encode(image));
        let messages = json!([{
            "role": "user",
            "content": [
                {"type": "text", "text": VISION_INSTRUCTION},
                {"type": "image_url", "image_url": {"url": data_url}},
            ],
        }]);

        tracing::info!("Transcribing image ({} bytes) with {}", image.len(), self.config.model);
        self.post_completion(messages).await
    }
}
