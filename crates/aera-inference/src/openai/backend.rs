//! OpenAI-compatible inference backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use aera_core::{
    defaults, BackoffPolicy, EmbeddingBackend, Error, GenerationBackend, GenerationOptions,
    InferenceBackend, Result, Vector,
};

use super::error::{to_aera_error, CallKind, OpenAIErrorCode};
use super::types::*;
use crate::vision::{image_data_url, VisionBackend, DEFAULT_DESCRIBE_PROMPT};

/// Configuration for an OpenAI-compatible backend (Mistral by default).
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// Bearer token. Calls fail with a configuration error when absent.
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    /// Vision-capable chat model used by [`VisionBackend`].
    pub vision_model: String,
    /// Width of vectors returned by `embed_model`.
    pub embed_dimension: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Backoff applied to every outbound request.
    pub retry: BackoffPolicy,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::MISTRAL_URL.to_string(),
            api_key: None,
            embed_model: defaults::TEXT_EMBED_MODEL.to_string(),
            gen_model: defaults::CHAT_MODEL.to_string(),
            vision_model: defaults::MISTRAL_VISION_MODEL.to_string(),
            embed_dimension: defaults::MISTRAL_EMBED_DIMENSION,
            timeout_seconds: defaults::PROVIDER_TIMEOUT_SECS,
            retry: BackoffPolicy::default(),
        }
    }
}

impl OpenAIConfig {
    /// Read `MISTRAL_*` from the environment.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var("MISTRAL_BASE_URL").unwrap_or(base.base_url),
            api_key: std::env::var("MISTRAL_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            embed_model: std::env::var("MISTRAL_EMBED_MODEL").unwrap_or(base.embed_model),
            gen_model: std::env::var("MISTRAL_CHAT_MODEL").unwrap_or(base.gen_model),
            vision_model: std::env::var("MISTRAL_VISION_MODEL").unwrap_or(base.vision_model),
            embed_dimension: std::env::var("MISTRAL_EMBED_DIMENSION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.embed_dimension),
            timeout_seconds: std::env::var("MISTRAL_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
            retry: base.retry,
        }
    }
}

/// OpenAI-compatible inference backend.
#[derive(Clone)]
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            key_configured = config.api_key.is_some(),
            "Initializing OpenAI-compatible backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("Mistral API key not configured (MISTRAL_API_KEY)".into()))
    }

    /// Build a request with bearer authentication.
    fn build_request(&self, endpoint: &str, api_key: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
    }

    /// POST `body` once and decode the response, mapping failures by status.
    async fn post_json<B, R>(&self, endpoint: &str, body: &B, kind: CallKind) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let api_key = self.api_key()?;
        let response = self
            .build_request(endpoint, api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| match kind {
                CallKind::Embedding => Error::Embedding(format!("Request failed: {}", e)),
                CallKind::Generation => Error::Inference(format!("Request failed: {}", e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, error_type) = parse_error_body(&text);
            let code = OpenAIErrorCode::from_response(status.as_u16(), &error_type);
            return Err(to_aera_error(code, kind, status.as_u16(), &message));
        }

        response.json::<R>().await.map_err(|e| match kind {
            CallKind::Embedding => Error::Embedding(format!("Failed to parse response: {}", e)),
            CallKind::Generation => Error::Inference(format!("Failed to parse response: {}", e)),
        })
    }

    /// Run a chat completion against `model` with retry.
    async fn chat(
        &self,
        op: &str,
        model: &str,
        messages: Vec<ChatMessage>,
        options: GenerationOptions,
    ) -> Result<String> {
        self.api_key()?;
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let result: ChatCompletionResponse = self
            .config
            .retry
            .run(op, || {
                self.post_json("/chat/completions", &request, CallKind::Generation)
            })
            .await?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openai",
            op,
            model,
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );
        Ok(content)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.api_key()?;

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let result: EmbeddingResponse = self
            .config
            .retry
            .run("embed_texts", || {
                self.post_json("/embeddings", &request, CallKind::Embedding)
            })
            .await?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let vectors: Vec<Vector> = data
            .into_iter()
            .map(|d| Vector::from(d.embedding))
            .collect();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed_texts",
            model = %self.config.embed_model,
            input_count = texts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embeddings generated"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_options(system, prompt, GenerationOptions::default())
            .await
    }

    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage::text("system", system));
        }
        messages.push(ChatMessage::text("user", prompt));

        self.chat("generate", &self.config.gen_model, messages, options)
            .await
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

#[async_trait]
impl InferenceBackend for OpenAIBackend {
    async fn health_check(&self) -> Result<bool> {
        let Ok(api_key) = self.api_key() else {
            return Ok(false);
        };
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(subsystem = "inference", component = "openai", status = %resp.status(), "Health check failed");
                Ok(false)
            }
            Err(e) => {
                warn!(subsystem = "inference", component = "openai", error = %e, "Health check error");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl VisionBackend for OpenAIBackend {
    async fn describe_image(
        &self,
        image_data: &[u8],
        mime_type: &str,
        prompt: Option<&str>,
    ) -> Result<String> {
        let image_url = image_data_url(image_data, mime_type)?;

        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.unwrap_or(DEFAULT_DESCRIBE_PROMPT).to_string(),
                },
                ContentPart::ImageUrl {
                    image_url,
                },
            ]),
        }];

        self.chat(
            "describe_image",
            &self.config.vision_model,
            messages,
            GenerationOptions::default(),
        )
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        InferenceBackend::health_check(self).await
    }

    fn model_name(&self) -> &str {
        &self.config.vision_model
    }
}
