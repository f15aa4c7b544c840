//! Gemini backend: vision generation and text embeddings.
//!
//! Talks to the Generative Language REST API. The API key travels as the
//! `key` query parameter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use aera_core::{
    defaults, BackoffPolicy, EmbeddingBackend, Error, GenerationBackend, GenerationOptions, Result,
    Vector,
};

use crate::vision::{encode_image, VisionBackend, DEFAULT_DESCRIBE_PROMPT};

/// Configuration for [`GeminiBackend`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Model used for `generateContent`.
    pub vision_model: String,
    /// Model used for high-quality image analysis.
    pub vision_model_high: String,
    /// Model used for `batchEmbedContents`.
    pub embed_model: String,
    pub embed_dimension: usize,
    pub timeout_seconds: u64,
    pub retry: BackoffPolicy,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::GEMINI_URL.to_string(),
            api_key: None,
            vision_model: defaults::GEMINI_VISION_MODEL.to_string(),
            vision_model_high: defaults::GEMINI_VISION_MODEL_HIGH.to_string(),
            embed_model: defaults::VISUAL_EMBED_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::PROVIDER_TIMEOUT_SECS,
            retry: BackoffPolicy::default(),
        }
    }
}

impl GeminiConfig {
    /// Read `GEMINI_*` and `EMBED_DIMENSION` from the environment.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(base.base_url),
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            vision_model: std::env::var("GEMINI_VISION_MODEL").unwrap_or(base.vision_model),
            vision_model_high: std::env::var("GEMINI_VISION_MODEL_HIGH")
                .unwrap_or(base.vision_model_high),
            embed_model: std::env::var("GEMINI_EMBED_MODEL").unwrap_or(base.embed_model),
            embed_dimension: std::env::var("EMBED_DIMENSION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.embed_dimension),
            timeout_seconds: base.timeout_seconds,
            retry: base.retry,
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// =============================================================================
// BACKEND
// =============================================================================

/// Gemini backend.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "gemini",
            url = %config.base_url,
            vision_model = %config.vision_model,
            embed_model = %config.embed_model,
            key_configured = config.api_key.is_some(),
            "Initializing Gemini backend"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env())
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// The same backend generating with the high-quality vision model.
    pub fn high_quality(&self) -> Self {
        let mut config = self.config.clone();
        config.vision_model = config.vision_model_high.clone();
        Self {
            client: self.client.clone(),
            config,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("Gemini API key not configured (GEMINI_API_KEY)".into()))
    }

    async fn post_json<B, R>(&self, url: &str, body: &B, embedding: bool) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let api_key = self.api_key()?;
        let wrap = |msg: String| {
            if embedding {
                Error::Embedding(msg)
            } else {
                Error::Inference(msg)
            }
        };

        let response = self
            .client
            .post(url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| wrap(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (message, error_status) = match serde_json::from_str::<GeminiErrorResponse>(&text) {
                Ok(parsed) => (parsed.error.message, parsed.error.status),
                Err(_) => (text.chars().take(500).collect(), String::new()),
            };
            let detail = format!("Gemini returned {}: {}", status.as_u16(), message);
            if status.as_u16() == 429 || error_status == "RESOURCE_EXHAUSTED" {
                return Err(Error::RateLimited(detail));
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::Config(detail));
            }
            return Err(wrap(detail));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| wrap(format!("Failed to parse response: {}", e)))
    }

    /// Call `generateContent` on the configured vision model.
    async fn generate_content(
        &self,
        op: &str,
        system: Option<&str>,
        parts: Vec<Part>,
        options: GenerationOptions,
    ) -> Result<String> {
        self.api_key()?;
        let start = Instant::now();
        let model = &self.config.vision_model;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let generation_config = (options.max_tokens.is_some() || options.temperature.is_some())
            .then(|| GenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
            });
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: system.filter(|s| !s.is_empty()).map(|s| Content {
                role: None,
                parts: vec![Part::Text {
                    text: s.to_string(),
                }],
            }),
            generation_config,
        };

        let response: GenerateContentResponse = self
            .config
            .retry
            .run(op, || self.post_json(&url, &request, false))
            .await?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| {
                c.parts.into_iter().find_map(|p| match p {
                    Part::Text { text } => Some(text),
                    Part::InlineData { .. } => None,
                })
            })
            .ok_or_else(|| Error::Inference("Gemini returned no candidates".to_string()))?;

        debug!(
            subsystem = "inference",
            component = "gemini",
            op,
            model = %model,
            response_len = text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Gemini generation finished"
        );
        Ok(text)
    }
}

#[async_trait]
impl VisionBackend for GeminiBackend {
    async fn describe_image(
        &self,
        image_data: &[u8],
        mime_type: &str,
        prompt: Option<&str>,
    ) -> Result<String> {
        let data = encode_image(image_data, mime_type)?;

        let parts = vec![
            Part::Text {
                text: prompt.unwrap_or(DEFAULT_DESCRIBE_PROMPT).to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.to_string(),
                    data,
                },
            },
        ];
        self.generate_content("describe_image", None, parts, GenerationOptions::default())
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        let Ok(api_key) = self.api_key() else {
            return Ok(false);
        };
        let url = format!(
            "{}/models/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.vision_model
        );
        match self
            .client
            .get(&url)
            .query(&[("key", api_key)])
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.vision_model
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
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
        let parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        self.generate_content("generate", Some(system), parts, options)
            .await
    }

    fn model_name(&self) -> &str {
        &self.config.vision_model
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.api_key()?;

        let model = &self.config.embed_model;
        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.config.base_url.trim_end_matches('/'),
            model
        );
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", model),
                    content: Content {
                        role: None,
                        parts: vec![Part::Text { text: text.clone() }],
                    },
                    output_dimensionality: self.config.embed_dimension,
                })
                .collect(),
        };

        let response: BatchEmbedResponse = self
            .config
            .retry
            .run("embed_texts", || self.post_json(&url, &request, true))
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        debug!(
            subsystem = "inference",
            component = "gemini",
            op = "embed_texts",
            model = %model,
            input_count = texts.len(),
            "Gemini embeddings generated"
        );

        Ok(response
            .embeddings
            .into_iter()
            .map(|e| Vector::from(e.values))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}
