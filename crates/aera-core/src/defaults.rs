//! Tunables shared across crates.
//!
//! Provider URLs and model names can be overridden through the environment;
//! the rest are fixed by the schema or the retrieval pipeline.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 1000;

/// Overlap characters between adjacent chunks.
pub const CHUNK_OVERLAP: usize = 100;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Embedding vector width expected by `match_documents` and the vector columns.
pub const EMBED_DIMENSION: usize = 768;

/// Chunk texts sent per embeddings request while indexing a body.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Mistral's embedding model. Its vectors are 1024 wide, so it can only feed
/// the index when `EMBED_DIMENSION` is raised to match.
pub const TEXT_EMBED_MODEL: &str = "mistral-embed";

/// Width of `mistral-embed` vectors. The API has no parameter to shrink them.
pub const MISTRAL_EMBED_DIMENSION: usize = 1024;

/// Gemini embedding model; `outputDimensionality` truncates it to
/// `EMBED_DIMENSION`. Documents, queries and image descriptions all use it.
pub const VISUAL_EMBED_MODEL: &str = "text-embedding-004";

// =============================================================================
// PROVIDERS
// =============================================================================

/// Default Mistral API base URL (OpenAI-compatible).
pub const MISTRAL_URL: &str = "https://api.mistral.ai/v1";

/// Default Mistral chat model.
pub const CHAT_MODEL: &str = "mistral-small-latest";

/// Default Mistral vision-capable model.
pub const MISTRAL_VISION_MODEL: &str = "pixtral-12b-2409";

/// Default Gemini API base URL.
pub const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini vision model.
pub const GEMINI_VISION_MODEL: &str = "gemini-1.5-flash";

/// Gemini vision model used for high-quality analysis.
pub const GEMINI_VISION_MODEL_HIGH: &str = "gemini-1.5-pro";

/// Timeout for provider requests in seconds.
pub const PROVIDER_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// RETRY
// =============================================================================

/// Retries after the first attempt for rate-limited provider calls.
pub const RETRY_MAX_RETRIES: u32 = 3;

/// Base backoff delay in milliseconds; doubles on each retry.
pub const RETRY_BASE_DELAY_MS: u64 = 2000;

// =============================================================================
// RETRIEVAL & CHAT
// =============================================================================

/// Matches requested from `match_documents` for chat context.
pub const CHAT_MATCH_COUNT: i64 = 5;

/// Default result count for the search endpoint.
pub const SEARCH_LIMIT: i64 = 10;

/// Upper bound on any caller-supplied result count.
pub const SEARCH_LIMIT_MAX: i64 = 50;

/// Hard cap on assembled prompt context, in characters.
pub const CONTEXT_MAX_CHARS: usize = 8000;

/// Separator placed between retrieved passages.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Placeholder used when retrieval produced nothing.
pub const NO_CONTEXT_PLACEHOLDER: &str = "No specific context available.";

/// `max_tokens` for answer synthesis.
pub const ANSWER_MAX_TOKENS: u32 = 1000;

/// Temperature for answer synthesis.
pub const ANSWER_TEMPERATURE: f32 = 0.3;

// =============================================================================
// INGESTION
// =============================================================================

/// Maximum tags kept per document.
pub const MAX_TAGS: usize = 8;

/// Lower bound of the pause between images in a workspace reprocess (ms).
pub const REPROCESS_DELAY_MIN_MS: u64 = 2000;

/// Upper bound of the pause between images in a workspace reprocess (ms).
pub const REPROCESS_DELAY_MAX_MS: u64 = 4000;

// =============================================================================
// STORAGE & SERVER
// =============================================================================

/// Default lifetime of a signed object URL in seconds.
pub const SIGNED_URL_EXPIRY_SECS: u64 = 3600;

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Maximum upload body size in bytes (50 MB).
pub const MAX_BODY_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Default CORS max-age in seconds.
pub const CORS_MAX_AGE_SECS: u64 = 3600;
