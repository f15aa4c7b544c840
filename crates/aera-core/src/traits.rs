//! Core traits for Aera abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// DOCUMENT REPOSITORY TRAITS
// =============================================================================

/// Repository for document rows and their derived embeddings.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document, returning its ID.
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid>;

    /// Fetch a document by ID.
    async fn fetch(&self, id: Uuid) -> Result<Document>;

    /// Find the document whose original lives at `storage_path`.
    async fn find_by_storage_path(&self, storage_path: &str) -> Result<Option<Document>>;

    /// List a user's documents, newest first.
    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<Document>>;

    /// Write ingestion output back to the row. Last writer wins.
    async fn apply_analysis(&self, id: Uuid, update: DocumentAnalysisUpdate) -> Result<()>;

    /// Replace every chunk embedding of a document.
    async fn replace_chunk_embeddings(
        &self,
        document_id: Uuid,
        chunks: Vec<ChunkEmbedding>,
        model: &str,
    ) -> Result<()>;

    /// Insert or replace the companion embedding for `(document_id, frame_index)`.
    async fn upsert_image_embedding(&self, embedding: ImageEmbedding) -> Result<()>;

    /// Case-insensitive substring search over a user's document titles.
    async fn search_titles(&self, user_id: Uuid, query: &str, limit: i64)
        -> Result<Vec<Document>>;

    /// Fetch display metadata for a set of documents, keyed by ID.
    async fn fetch_metadata(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, DocumentMetadata>>;

    /// Delete a document. Embeddings cascade.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// SEARCH TRAITS
// =============================================================================

/// Vector similarity search over a user's indexed content.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Return up to `match_count` passages ordered by descending similarity.
    async fn match_documents(
        &self,
        query_embedding: &Vector,
        match_count: i64,
        user_id: Uuid,
    ) -> Result<Vec<SearchMatch>>;
}

// =============================================================================
// CHAT & SESSION TRAITS
// =============================================================================

/// Persistence for chat sessions and their turns.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_session(
        &self,
        user_id: Uuid,
        workspace_id: Uuid,
        title: &str,
    ) -> Result<ChatSession>;

    async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>>;

    async fn list_sessions(
        &self,
        user_id: Uuid,
        workspace_id: Option<Uuid>,
    ) -> Result<Vec<ChatSession>>;

    /// Delete a session and its messages.
    async fn delete_session(&self, id: Uuid) -> Result<()>;

    async fn append_message(&self, message: NewChatMessage) -> Result<ChatMessage>;

    /// Messages in a session, oldest first.
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>>;
}

/// Resolves bearer tokens to user identities.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Returns `None` for unknown or expired tokens.
    async fn resolve_token(&self, token: &str) -> Result<Option<Uuid>>;
}

// =============================================================================
// STORAGE TRAITS
// =============================================================================

/// Object storage for uploaded document bytes.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, data: &[u8], content_type: &str) -> Result<()>;

    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Produce a time-limited URL for reading the object at `path`.
    async fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String>;

    async fn remove(&self, path: &str) -> Result<()>;

    /// Remove several objects; missing objects are ignored.
    async fn remove_many(&self, paths: &[String]) -> Result<()>;

    /// Check the `expires`/`signature` pair from a signed URL.
    ///
    /// Stores that do not sign their URLs reject every signature.
    fn verify_signature(&self, _path: &str, _expires: i64, _signature: &str) -> bool {
        false
    }
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate text with system context and sampling options.
    ///
    /// Backends that cannot honour the options fall back to
    /// [`generate_with_system`](Self::generate_with_system).
    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        let _ = options;
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}
