//! Semantic retrieval with a title-substring fallback.
//!
//! The primary path embeds the query and calls the `match_documents`
//! similarity function. When the query cannot be embedded, or the similarity
//! call fails, the retriever falls back to a case-insensitive title match and
//! records why in [`RetrievalOutcome::degradation`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use aera_core::{
    defaults, ensure_dimension, Degradation, DegradationReason, DocumentMetadata,
    DocumentRepository, EmbeddingBackend, EnrichedResult, Error, Result, SearchMatch, SearchType,
    SimilaritySearch, Vector,
};
use aera_inference::embed_query;

/// Clamp a caller-supplied result count to `1..=SEARCH_LIMIT_MAX`.
pub fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit
        .unwrap_or(default)
        .clamp(1, defaults::SEARCH_LIMIT_MAX)
}

/// Results of one retrieval, with the path that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub results: Vec<EnrichedResult>,
    pub search_type: SearchType,
    /// Present whenever the semantic path was abandoned.
    pub degradation: Option<Degradation>,
}

impl RetrievalOutcome {
    pub fn degraded(&self) -> bool {
        self.degradation.is_some()
    }

    pub fn reason(&self) -> Option<DegradationReason> {
        self.degradation.as_ref().map(|d| d.reason)
    }

    /// Distinct document ids in rank order.
    pub fn document_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::with_capacity(self.results.len());
        for result in &self.results {
            if !ids.contains(&result.document_id) {
                ids.push(result.document_id);
            }
        }
        ids
    }

    /// Non-empty result contents, in rank order.
    pub fn snippets(&self) -> Vec<&str> {
        self.results
            .iter()
            .map(|r| r.content.as_str())
            .filter(|c| !c.trim().is_empty())
            .collect()
    }

    /// Keep the first `limit` results belonging to `workspace_id`.
    pub fn restrict_to_workspace(&mut self, workspace_id: Uuid, limit: usize) {
        self.results
            .retain(|r| r.workspace_id == Some(workspace_id));
        self.results.truncate(limit);
    }
}

/// Query-time retriever over the document index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingBackend>,
    similarity: Arc<dyn SimilaritySearch>,
    documents: Arc<dyn DocumentRepository>,
    dimension: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        similarity: Arc<dyn SimilaritySearch>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            embedder,
            similarity,
            documents,
            dimension: defaults::EMBED_DIMENSION,
        }
    }

    /// Override the vector width the similarity index expects.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Embed `query` and check its width against the index.
    async fn embed(&self, query: &str) -> Result<Vector> {
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        ensure_dimension(&vector, self.dimension)?;
        Ok(vector)
    }

    /// The semantic path: embed, then call the similarity function.
    async fn semantic(
        &self,
        user_id: Uuid,
        query: &str,
        limit: i64,
    ) -> std::result::Result<Vec<SearchMatch>, Degradation> {
        let embedding = self.embed(query).await.map_err(|e| {
            Degradation::new(DegradationReason::EmbeddingFailed, e.to_string())
        })?;

        self.similarity
            .match_documents(&embedding, limit, user_id)
            .await
            .map_err(|e| Degradation::new(DegradationReason::SemanticSearchFailed, e.to_string()))
    }

    /// Retrieve up to `limit` results for `query`, owned by `user_id`.
    #[instrument(skip_all, fields(
        subsystem = "search",
        component = "retriever",
        op = "search",
        user_id = %user_id,
        query_len = query.len(),
        limit,
    ))]
    pub async fn search(&self, user_id: Uuid, query: &str, limit: i64) -> Result<RetrievalOutcome> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("Query must not be empty".to_string()));
        }
        let limit = limit.clamp(1, defaults::SEARCH_LIMIT_MAX);

        let outcome = match self.semantic(user_id, query, limit).await {
            Ok(matches) => {
                let results = self.enrich(matches).await?;
                RetrievalOutcome {
                    results,
                    search_type: SearchType::Semantic,
                    degradation: None,
                }
            }
            Err(degradation) => {
                warn!(
                    reason = %degradation.reason,
                    error = %degradation.detail,
                    "Semantic retrieval unavailable, falling back to title search"
                );
                let results = self.title_search(user_id, query, limit).await?;
                RetrievalOutcome {
                    results,
                    search_type: SearchType::Text,
                    degradation: Some(degradation),
                }
            }
        };

        info!(
            search_type = %outcome.search_type,
            result_count = outcome.results.len(),
            degraded = outcome.degraded(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Retrieval complete"
        );
        Ok(outcome)
    }

    /// Case-insensitive substring match on titles.
    async fn title_search(
        &self,
        user_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<EnrichedResult>> {
        let docs = self.documents.search_titles(user_id, query, limit).await?;
        Ok(docs
            .into_iter()
            .map(|doc| {
                let content = doc
                    .description
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .or_else(|| doc.ai_summary.clone())
                    .unwrap_or_else(|| doc.title.clone());
                EnrichedResult {
                    document_id: doc.id,
                    content,
                    similarity: None,
                    title: Some(doc.title),
                    subject: doc.subject,
                    topic: doc.topic,
                    workspace_id: doc.workspace_id,
                    created_at: Some(doc.created_at),
                }
            })
            .collect())
    }

    /// Join document metadata onto similarity matches.
    async fn enrich(&self, matches: Vec<SearchMatch>) -> Result<Vec<EnrichedResult>> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<Uuid> = matches.iter().map(|m| m.document_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let metadata: HashMap<Uuid, DocumentMetadata> =
            self.documents.fetch_metadata(&ids).await?;
        debug!(
            match_count = matches.len(),
            metadata_count = metadata.len(),
            "Joined document metadata"
        );

        Ok(matches
            .into_iter()
            .map(|m| {
                let meta = metadata.get(&m.document_id);
                EnrichedResult {
                    document_id: m.document_id,
                    content: m.content,
                    similarity: Some(m.similarity),
                    title: meta.map(|d| d.title.clone()),
                    subject: meta.and_then(|d| d.subject.clone()),
                    topic: meta.and_then(|d| d.topic.clone()),
                    workspace_id: meta.and_then(|d| d.workspace_id),
                    created_at: meta.map(|d| d.created_at),
                }
            })
            .collect())
    }
}
