//! Core data models for Aera.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// DOCUMENT TYPES
// =============================================================================

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

/// Coarse classification of a document by MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Text,
    Video,
    Other,
}

impl DocumentKind {
    /// Classify a MIME type. Parameters (`; charset=...`) are ignored.
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.starts_with("image/") {
            Self::Image
        } else if essence.starts_with("video/") {
            Self::Video
        } else if essence.starts_with("text/")
            || matches!(
                essence.as_str(),
                "application/pdf" | "application/json" | "application/markdown"
            )
        {
            Self::Text
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Text => write!(f, "text"),
            Self::Video => write!(f, "video"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "text" => Ok(Self::Text),
            "video" => Ok(Self::Video),
            "other" => Ok(Self::Other),
            _ => Err(format!("Invalid document kind: {}", s)),
        }
    }
}

/// An uploaded artifact and its derived analysis fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub title: String,
    pub mime_type: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub ai_summary: Option<String>,
    pub detailed_analysis: Option<JsonValue>,
    pub searchable_text: Option<String>,
    pub analysis_model: Option<String>,
    /// Document-level embedding. Never serialized to clients.
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_mime(&self.mime_type)
    }
}

/// Request for creating a document row after its bytes are stored.
#[derive(Debug, Clone)]
pub struct CreateDocumentRequest {
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub title: String,
    pub mime_type: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub topic: Option<String>,
}

/// Request for listing documents.
#[derive(Debug, Clone, Default)]
pub struct ListDocumentsRequest {
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub kind: Option<DocumentKind>,
    pub limit: Option<i64>,
}

/// Fields written back by ingestion.
///
/// `None` means "not produced"; the column is left untouched.
#[derive(Debug, Clone)]
pub struct DocumentAnalysisUpdate {
    pub embedding: Option<Vector>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ai_summary: Option<String>,
    pub detailed_analysis: Option<JsonValue>,
    pub searchable_text: Option<String>,
    pub analysis_model: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl DocumentAnalysisUpdate {
    /// An update that only stamps `processed_at`.
    pub fn processed_now() -> Self {
        Self {
            embedding: None,
            description: None,
            tags: None,
            ai_summary: None,
            detailed_analysis: None,
            searchable_text: None,
            analysis_model: None,
            processed_at: Utc::now(),
        }
    }

    /// Names of the optional fields this update carries.
    pub fn written_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.embedding.is_some() {
            fields.push("embedding");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        if self.ai_summary.is_some() {
            fields.push("ai_summary");
        }
        if self.detailed_analysis.is_some() {
            fields.push("detailed_analysis");
        }
        if self.searchable_text.is_some() {
            fields.push("searchable_text");
        }
        if self.analysis_model.is_some() {
            fields.push("analysis_model");
        }
        fields
    }
}

/// Embedding of one chunk of a document's body.
#[derive(Debug, Clone)]
pub struct ChunkEmbedding {
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vector,
}

/// Companion embedding for an image (or a video frame).
#[derive(Debug, Clone)]
pub struct ImageEmbedding {
    pub document_id: Uuid,
    pub frame_index: i32,
    pub embedding: Vector,
    pub description: String,
    pub model: String,
}

// =============================================================================
// ANALYSIS TYPES
// =============================================================================

/// Which model family analyzes images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisProvider {
    /// Try Gemini first, then Mistral.
    #[default]
    Auto,
    Gemini,
    Mistral,
}

impl std::fmt::Display for AnalysisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gemini => write!(f, "gemini"),
            Self::Mistral => write!(f, "mistral"),
        }
    }
}

impl std::str::FromStr for AnalysisProvider {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gemini" => Ok(Self::Gemini),
            "mistral" => Ok(Self::Mistral),
            _ => Err(format!("Invalid analysis provider: {}", s)),
        }
    }
}

/// Caller's hint on how much effort image analysis should spend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisQuality {
    Fast,
    #[default]
    Standard,
    High,
}

impl std::str::FromStr for AnalysisQuality {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" | "low" => Ok(Self::Fast),
            "standard" | "medium" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid analysis quality: {}", s)),
        }
    }
}

/// Structured description of an image returned by a vision model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailedAnalysis {
    pub clothing: Option<String>,
    pub setting: Option<String>,
    pub mood: Option<String>,
    pub style: Option<String>,
    pub people: Option<String>,
    pub text_content: Option<String>,
    pub colors: Vec<String>,
    pub objects: Vec<String>,
}

impl DetailedAnalysis {
    /// Non-empty textual fields, in a stable order.
    pub fn text_fields(&self) -> Vec<String> {
        let mut out: Vec<String> = [
            &self.clothing,
            &self.setting,
            &self.mood,
            &self.style,
            &self.people,
            &self.text_content,
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .collect();

        if !self.colors.is_empty() {
            out.push(self.colors.join(", "));
        }
        if !self.objects.is_empty() {
            out.push(self.objects.join(", "));
        }
        out
    }
}

/// Per-kind result of ingesting a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentAnalysis {
    Image {
        description: Option<String>,
        detailed: Option<DetailedAnalysis>,
        tags: Vec<String>,
        model: Option<String>,
        /// True when the title-only fallback produced the embedding.
        used_title_fallback: bool,
    },
    Text {
        tags: Vec<String>,
        ai_summary: Option<String>,
        chunk_count: usize,
    },
    Video {
        tags: Vec<String>,
    },
    Other {
        tags: Vec<String>,
        ai_summary: Option<String>,
    },
}

impl DocumentAnalysis {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::Image { .. } => DocumentKind::Image,
            Self::Text { .. } => DocumentKind::Text,
            Self::Video { .. } => DocumentKind::Video,
            Self::Other { .. } => DocumentKind::Other,
        }
    }
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// One row returned by the `match_documents` similarity function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub document_id: Uuid,
    pub content: String,
    pub similarity: f32,
}

/// Metadata joined onto search results after retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub title: String,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Which retrieval path produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Semantic,
    Text,
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Semantic => write!(f, "semantic"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Why a fallback path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationReason {
    /// The query or document could not be embedded.
    EmbeddingFailed,
    /// The similarity RPC returned an error.
    SemanticSearchFailed,
    /// Image analysis failed; the title was used instead.
    AnalysisFailed,
    /// Both retrieval paths failed; the answer was produced without context.
    RetrievalFailed,
}

impl std::fmt::Display for DegradationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmbeddingFailed => write!(f, "embedding_failed"),
            Self::SemanticSearchFailed => write!(f, "semantic_search_failed"),
            Self::AnalysisFailed => write!(f, "analysis_failed"),
            Self::RetrievalFailed => write!(f, "retrieval_failed"),
        }
    }
}

/// Explicit record of a degraded result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub reason: DegradationReason,
    pub detail: String,
}

impl Degradation {
    pub fn new(reason: DegradationReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// A retrieval hit with document metadata joined in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub document_id: Uuid,
    pub content: String,
    /// Cosine similarity; absent for text-search hits.
    pub similarity: Option<f32>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub workspace_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// A persisted conversation scoped to a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Invalid chat role: {}", s)),
        }
    }
}

/// A persisted chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    /// Documents whose passages informed an assistant turn.
    pub context_document_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Request for appending a turn to a session.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub context_document_ids: Vec<Uuid>,
}

// =============================================================================
// GENERATION TYPES
// =============================================================================

/// Sampling options forwarded to chat-completion endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}
