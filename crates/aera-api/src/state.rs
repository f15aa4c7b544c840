//! Shared application state.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tracing::warn;

use aera_core::{
    ChatRepository, DocumentRepository, EmbeddingBackend, GenerationBackend, ObjectStorage,
    SessionRepository, SimilaritySearch,
};
use aera_inference::{ImageAnalyzer, VisualEmbedder};
use aera_ingest::{IngestionOrchestrator, Tagger, WorkspaceReprocessor};
use aera_search::{AnswerSynthesizer, ChatService, Retriever};

/// Global rate limiter (direct quota, no per-client buckets).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Persistence and provider handles the services are built from.
pub struct Backends {
    pub documents: Arc<dyn DocumentRepository>,
    pub similarity: Arc<dyn SimilaritySearch>,
    pub chat: Arc<dyn ChatRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    /// Text embeddings for queries, titles, and chunks.
    pub embedder: Arc<dyn EmbeddingBackend>,
    /// Chat model for answers, tags, and summaries.
    pub generator: Arc<dyn GenerationBackend>,
    pub visual_embedder: VisualEmbedder,
    pub analyzer: Arc<dyn ImageAnalyzer>,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentRepository>,
    pub chat_history: Arc<dyn ChatRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub retriever: Retriever,
    pub chat: ChatService,
    pub ingestion: IngestionOrchestrator,
    pub reprocessor: WorkspaceReprocessor,
    /// None when rate limiting is disabled.
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    /// Wire the retrieval and ingestion services over `backends`.
    pub fn new(backends: Backends) -> Self {
        let Backends {
            documents,
            similarity,
            chat,
            sessions,
            storage,
            embedder,
            generator,
            visual_embedder,
            analyzer,
        } = backends;

        let retriever = Retriever::new(embedder.clone(), similarity, documents.clone());
        let chat_service = ChatService::new(
            retriever.clone(),
            AnswerSynthesizer::new(generator.clone()),
            chat.clone(),
        );
        let ingestion = IngestionOrchestrator::new(
            documents.clone(),
            storage.clone(),
            embedder,
            visual_embedder,
            analyzer,
            Tagger::new(generator),
        );
        let reprocessor = WorkspaceReprocessor::new(ingestion.clone(), documents.clone());

        Self {
            documents,
            chat_history: chat,
            sessions,
            storage,
            retriever,
            chat: chat_service,
            ingestion,
            reprocessor,
            rate_limiter: None,
        }
    }

    /// Allow `requests` per `period_secs`. A zero value disables limiting.
    pub fn with_rate_limit(mut self, requests: u64, period_secs: u64) -> Self {
        let burst = u32::try_from(requests).ok().and_then(NonZeroU32::new);
        let quota = Quota::with_period(Duration::from_secs(period_secs))
            .zip(burst)
            .map(|(quota, burst)| quota.allow_burst(burst));

        self.rate_limiter = match quota {
            Some(quota) => Some(Arc::new(RateLimiter::direct(quota))),
            None => {
                warn!(
                    subsystem = "api",
                    requests, period_secs, "Invalid rate limit settings, limiting disabled"
                );
                None
            }
        };
        self
    }

    /// Pause range between images during workspace reprocessing.
    pub fn with_reprocess_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.reprocessor = self.reprocessor.with_delay_ms(min, max);
        self
    }
}
