//! Per-document ingestion.
//!
//! A document is classified by MIME type and routed to one branch. Each
//! derived field is produced independently: whatever succeeds is written,
//! whatever fails is recorded in the report, and `processed_at` is always
//! stamped.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use aera_core::{
    chunk_text, defaults, ensure_dimension, AnalysisProvider, AnalysisQuality, ChunkEmbedding,
    DegradationReason, Document, DocumentAnalysis, DocumentAnalysisUpdate, DocumentKind,
    DocumentRepository, EmbeddingBackend, Error, ImageEmbedding, ObjectStorage, Result, Vector,
};
use aera_inference::{embed_query, ImageAnalysis, ImageAnalyzer, VisualEmbedder};

use crate::tagging::Tagger;

/// Caller-selected analysis options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub provider: AnalysisProvider,
    pub quality: AnalysisQuality,
}

/// A derived field that could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFailure {
    pub field: &'static str,
    pub error: String,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub document_id: Uuid,
    pub kind: DocumentKind,
    pub analysis: DocumentAnalysis,
    /// Fields written to the document row.
    pub updated_fields: Vec<&'static str>,
    pub degraded: bool,
    pub reason: Option<DegradationReason>,
    pub failures: Vec<FieldFailure>,
}

/// Chunking parameters for text bodies.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: defaults::CHUNK_SIZE,
            overlap: defaults::CHUNK_OVERLAP,
        }
    }
}

/// Collects failures while a branch runs.
#[derive(Default)]
struct Failures(Vec<FieldFailure>);

impl Failures {
    fn record(&mut self, document_id: Uuid, field: &'static str, error: &Error) {
        warn!(
            subsystem = "ingest",
            component = "orchestrator",
            document_id = %document_id,
            field,
            error = %error,
            "Derived field failed"
        );
        self.0.push(FieldFailure {
            field,
            error: error.to_string(),
        });
    }

    /// `Some(value)` on success; records and returns `None` on failure.
    fn keep<T>(&mut self, document_id: Uuid, field: &'static str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.record(document_id, field, &e);
                None
            }
        }
    }
}

/// Fields produced by a branch, before they are written.
struct BranchOutput {
    analysis: DocumentAnalysis,
    update: DocumentAnalysisUpdate,
    reason: Option<DegradationReason>,
}

/// Populates derived fields for uploaded documents.
#[derive(Clone)]
pub struct IngestionOrchestrator {
    documents: Arc<dyn DocumentRepository>,
    storage: Arc<dyn ObjectStorage>,
    text_embedder: Arc<dyn EmbeddingBackend>,
    visual_embedder: VisualEmbedder,
    analyzer: Arc<dyn ImageAnalyzer>,
    tagger: Tagger,
    chunking: ChunkingConfig,
    embed_batch_size: usize,
    dimension: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        storage: Arc<dyn ObjectStorage>,
        text_embedder: Arc<dyn EmbeddingBackend>,
        visual_embedder: VisualEmbedder,
        analyzer: Arc<dyn ImageAnalyzer>,
        tagger: Tagger,
    ) -> Self {
        Self {
            documents,
            storage,
            text_embedder,
            visual_embedder,
            analyzer,
            tagger,
            chunking: ChunkingConfig::default(),
            embed_batch_size: defaults::EMBED_BATCH_SIZE,
            dimension: defaults::EMBED_DIMENSION,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Cap the chunk texts per embeddings request. Zero is treated as one.
    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Classify, analyze, and write back one document.
    ///
    /// Only a missing document or a failed final write is an error; every
    /// analysis failure is captured in the report.
    #[instrument(skip_all, fields(
        subsystem = "ingest",
        component = "orchestrator",
        op = "process",
        document_id = %document_id,
    ))]
    pub async fn process(
        &self,
        document_id: Uuid,
        options: ProcessOptions,
    ) -> Result<IngestionReport> {
        let start = Instant::now();
        let document = self.documents.fetch(document_id).await?;
        let kind = document.kind();
        let mut failures = Failures::default();

        debug!(kind = %kind, mime_type = %document.mime_type, "Classified document");

        let output = match kind {
            DocumentKind::Image => self.process_image(&document, options, &mut failures).await,
            DocumentKind::Text => self.process_text(&document, &mut failures).await,
            DocumentKind::Video => self.process_video(&document, &mut failures).await,
            DocumentKind::Other => self.process_other(&document, &mut failures).await,
        };

        let BranchOutput {
            analysis,
            update,
            mut reason,
        } = output;
        if reason.is_none() && update.embedding.is_none() {
            reason = Some(DegradationReason::EmbeddingFailed);
        }

        let updated_fields = update.written_fields();
        self.documents.apply_analysis(document_id, update).await?;

        info!(
            kind = %kind,
            updated = ?updated_fields,
            failure_count = failures.0.len(),
            degraded = reason.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Document processed"
        );

        Ok(IngestionReport {
            document_id,
            kind,
            analysis,
            updated_fields,
            degraded: reason.is_some(),
            reason,
            failures: failures.0,
        })
    }

    /// Embed one text with the text embedder, checking its width.
    async fn embed_text(&self, text: &str) -> Result<Vector> {
        let vector = embed_query(self.text_embedder.as_ref(), text).await?;
        ensure_dimension(&vector, self.dimension)?;
        Ok(vector)
    }

    async fn process_image(
        &self,
        document: &Document,
        options: ProcessOptions,
        failures: &mut Failures,
    ) -> BranchOutput {
        let mut update = DocumentAnalysisUpdate::processed_now();

        match self.analyze_image(document, options).await {
            Ok((analysis, embedding)) => {
                let searchable = analysis.searchable_text();
                let detailed = serde_json::to_value(&analysis.detailed).ok();
                let tags = if analysis.tags.is_empty() {
                    failures.keep(
                        document.id,
                        "tags",
                        self.tagger.tags(&searchable).await.map(|(t, _)| t),
                    )
                } else {
                    Some(analysis.tags.clone())
                };

                update.embedding = Some(embedding);
                update.description = Some(analysis.description.clone());
                update.tags = tags.clone();
                update.detailed_analysis = detailed;
                update.searchable_text = Some(searchable);
                update.analysis_model = Some(analysis.model.clone());

                BranchOutput {
                    analysis: DocumentAnalysis::Image {
                        description: Some(analysis.description),
                        detailed: Some(analysis.detailed),
                        tags: tags.unwrap_or_default(),
                        model: Some(analysis.model),
                        used_title_fallback: false,
                    },
                    update,
                    reason: None,
                }
            }
            Err(e) => {
                failures.record(document.id, "image_analysis", &e);
                let title = document.title.trim();

                update.embedding = failures.keep(document.id, "embedding", self.embed_text(title).await);
                let tags = failures.keep(
                    document.id,
                    "tags",
                    self.tagger.tags(title).await.map(|(t, _)| t),
                );
                update.tags = tags.clone();

                BranchOutput {
                    analysis: DocumentAnalysis::Image {
                        description: None,
                        detailed: None,
                        tags: tags.unwrap_or_default(),
                        model: None,
                        used_title_fallback: update.embedding.is_some(),
                    },
                    update,
                    reason: Some(DegradationReason::AnalysisFailed),
                }
            }
        }
    }

    /// Download, analyze, embed, and store the companion image embedding.
    async fn analyze_image(
        &self,
        document: &Document,
        options: ProcessOptions,
    ) -> Result<(ImageAnalysis, Vector)> {
        let bytes = self.storage.download(&document.storage_path).await?;
        let analysis = self
            .analyzer
            .analyze(
                &bytes,
                &document.mime_type,
                &document.title,
                options.provider,
                options.quality,
            )
            .await?;

        let embedding = self
            .visual_embedder
            .embed_description(&analysis.searchable_text())
            .await?;
        ensure_dimension(&embedding, self.dimension)?;

        self.documents
            .upsert_image_embedding(ImageEmbedding {
                document_id: document.id,
                frame_index: 0,
                embedding: embedding.clone(),
                description: analysis.description.clone(),
                model: self.visual_embedder.model_name().to_string(),
            })
            .await?;

        Ok((analysis, embedding))
    }

    /// Embedding, tags, and summary for `blob`, derived concurrently.
    async fn embed_tag_summarize(
        &self,
        document_id: Uuid,
        blob: &str,
        failures: &mut Failures,
    ) -> (Option<Vector>, Option<Vec<String>>, Option<String>) {
        let (embedding, tags, summary) = tokio::join!(
            self.embed_text(blob),
            self.tagger.tags(blob),
            self.tagger.summarize(blob),
        );
        (
            failures.keep(document_id, "embedding", embedding),
            failures.keep(document_id, "tags", tags.map(|(t, _)| t)),
            failures.keep(document_id, "ai_summary", summary),
        )
    }

    async fn process_text(&self, document: &Document, failures: &mut Failures) -> BranchOutput {
        let blob = match document.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => {
                format!("{}\n\n{}", document.title.trim(), description)
            }
            _ => document.title.trim().to_string(),
        };

        let (embedding, tags, summary) =
            self.embed_tag_summarize(document.id, &blob, failures).await;

        let chunk_count = if is_plain_text(&document.mime_type) {
            let result = self.index_body(document).await;
            failures.keep(document.id, "chunks", result).unwrap_or(0)
        } else {
            0
        };

        let mut update = DocumentAnalysisUpdate::processed_now();
        update.embedding = embedding;
        update.tags = tags.clone();
        update.ai_summary = summary.clone();

        BranchOutput {
            analysis: DocumentAnalysis::Text {
                tags: tags.unwrap_or_default(),
                ai_summary: summary,
                chunk_count,
            },
            update,
            reason: None,
        }
    }

    /// Chunk and embed a plain-text body, replacing earlier chunk rows.
    async fn index_body(&self, document: &Document) -> Result<usize> {
        let bytes = self.storage.download(&document.storage_path).await?;
        let body = String::from_utf8_lossy(&bytes);
        let chunks = chunk_text(&body, self.chunking.max_chars, self.chunking.overlap);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            let embedded = self.text_embedder.embed_texts(batch).await?;
            if embedded.len() != batch.len() {
                return Err(Error::Embedding(format!(
                    "Expected {} chunk embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }
        debug!(
            chunk_count = texts.len(),
            batch_count = texts.len().div_ceil(self.embed_batch_size),
            "Embedded body chunks"
        );

        let mut rows = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(vectors) {
            ensure_dimension(&embedding, self.dimension)?;
            rows.push(ChunkEmbedding {
                chunk_index: chunk.id as i32,
                content: chunk.content,
                embedding,
            });
        }

        let count = rows.len();
        self.documents
            .replace_chunk_embeddings(document.id, rows, self.text_embedder.model_name())
            .await?;
        debug!(chunk_count = count, "Indexed document body");
        Ok(count)
    }

    async fn process_video(&self, document: &Document, failures: &mut Failures) -> BranchOutput {
        let blob = format!("Video: {}", document.title.trim());
        let (embedding, tags) = tokio::join!(self.embed_text(&blob), self.tagger.tags(&blob));
        let embedding = failures.keep(document.id, "embedding", embedding);
        let tags = failures.keep(document.id, "tags", tags.map(|(t, _)| t));

        let mut update = DocumentAnalysisUpdate::processed_now();
        update.embedding = embedding;
        update.tags = tags.clone();

        BranchOutput {
            analysis: DocumentAnalysis::Video {
                tags: tags.unwrap_or_default(),
            },
            update,
            reason: None,
        }
    }

    async fn process_other(&self, document: &Document, failures: &mut Failures) -> BranchOutput {
        let blob = document.title.trim().to_string();
        let (embedding, tags, summary) =
            self.embed_tag_summarize(document.id, &blob, failures).await;

        let mut update = DocumentAnalysisUpdate::processed_now();
        update.embedding = embedding;
        update.tags = tags.clone();
        update.ai_summary = summary.clone();

        BranchOutput {
            analysis: DocumentAnalysis::Other {
                tags: tags.unwrap_or_default(),
                ai_summary: summary,
            },
            update,
            reason: None,
        }
    }
}

/// Bodies worth chunking: `text/*` plus markdown and JSON.
fn is_plain_text(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence == "application/json"
        || essence == "application/markdown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plain_text() {
        assert!(is_plain_text("text/plain"));
        assert!(is_plain_text("text/markdown; charset=utf-8"));
        assert!(is_plain_text("application/json"));
        assert!(!is_plain_text("application/pdf"));
        assert!(!is_plain_text("image/png"));
    }

    #[test]
    fn test_failures_keep() {
        let id = Uuid::new_v4();
        let mut failures = Failures::default();
        assert_eq!(failures.keep(id, "tags", Ok(3)), Some(3));
        assert_eq!(
            failures.keep::<i32>(id, "ai_summary", Err(Error::Inference("down".into()))),
            None
        );
        assert_eq!(failures.0.len(), 1);
        assert_eq!(failures.0[0].field, "ai_summary");
    }

    #[test]
    fn test_default_options() {
        let options = ProcessOptions::default();
        assert_eq!(options.provider, AnalysisProvider::Auto);
        assert_eq!(options.quality, AnalysisQuality::Standard);
    }
}
