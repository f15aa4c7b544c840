//! Query embedding and describe-then-embed for images.

use std::sync::Arc;

use tracing::{debug, info};

use aera_core::{ensure_dimension, EmbeddingBackend, Error, Result, Vector};

use crate::vision::VisionBackend;

/// Embed a single text and return its vector.
pub async fn embed_query(backend: &dyn EmbeddingBackend, text: &str) -> Result<Vector> {
    backend
        .embed_texts(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("Backend returned no embedding".to_string()))
}

/// Text embedded by [`verify_embedding_width`].
const WIDTH_CHECK_TEXT: &str = "Aera embedding width check";

/// The first backend whose declared width matches the index.
///
/// Documents, queries and image descriptions must share one embedding space,
/// so a single backend is chosen for all of them.
pub fn select_index_embedder(
    candidates: &[Arc<dyn EmbeddingBackend>],
    expected: usize,
) -> Result<Arc<dyn EmbeddingBackend>> {
    if let Some(backend) = candidates.iter().find(|b| b.dimension() == expected) {
        return Ok(backend.clone());
    }
    let offered: Vec<String> = candidates
        .iter()
        .map(|b| format!("{} ({})", b.model_name(), b.dimension()))
        .collect();
    Err(Error::Config(format!(
        "No configured embedding model produces {}-dimensional vectors; available: [{}]",
        expected,
        offered.join(", ")
    )))
}

/// Embed a short text and confirm the provider returns `expected` values.
///
/// A width mismatch is a `Config` error; provider failures pass through.
pub async fn verify_embedding_width(backend: &dyn EmbeddingBackend, expected: usize) -> Result<()> {
    let vector = embed_query(backend, WIDTH_CHECK_TEXT).await?;
    ensure_dimension(&vector, expected).map_err(|_| {
        Error::Config(format!(
            "Embedding model {} returned {} values, index expects {}",
            backend.model_name(),
            vector.as_slice().len(),
            expected
        ))
    })?;
    info!(
        subsystem = "inference",
        component = "embedder",
        model = backend.model_name(),
        dimension = expected,
        "Embedding width verified"
    );
    Ok(())
}

/// Images are never embedded directly: a vision model describes the image
/// and the description is embedded as text.
#[derive(Clone)]
pub struct VisualEmbedder {
    vision: Arc<dyn VisionBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
}

/// Description and vector produced by [`VisualEmbedder::describe_and_embed`].
#[derive(Debug, Clone)]
pub struct VisualEmbedding {
    pub description: String,
    pub embedding: Vector,
    pub model: String,
}

impl VisualEmbedder {
    pub fn new(vision: Arc<dyn VisionBackend>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { vision, embedder }
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Embed an already-produced image description.
    pub async fn embed_description(&self, description: &str) -> Result<Vector> {
        if description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Cannot embed an empty image description".to_string(),
            ));
        }
        embed_query(self.embedder.as_ref(), description).await
    }

    /// Describe the image, then embed the description.
    pub async fn describe_and_embed(
        &self,
        image_data: &[u8],
        mime_type: &str,
    ) -> Result<VisualEmbedding> {
        let description = self
            .vision
            .describe_image(image_data, mime_type, None)
            .await?;
        let embedding = self.embed_description(&description).await?;

        debug!(
            subsystem = "inference",
            component = "visual_embedder",
            vision_model = self.vision.model_name(),
            embed_model = self.embedder.model_name(),
            description_len = description.len(),
            "Image described and embedded"
        );

        Ok(VisualEmbedding {
            description,
            embedding,
            model: self.vision.model_name().to_string(),
        })
    }
}
