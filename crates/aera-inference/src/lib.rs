//! # aera-inference
//!
//! Hosted AI provider backends for Aera.
//!
//! This crate provides:
//! - OpenAI-compatible backend (Mistral by default): embeddings, chat
//!   completions and `image_url` vision
//! - Gemini backend: `generateContent` vision/generation and
//!   `batchEmbedContents` embeddings
//! - Describe-then-embed for images
//! - Multi-model image analysis with provider fallback
//! - Tolerant parsing of JSON embedded in model output
//!
//! Every outbound request goes through the [`aera_core::BackoffPolicy`]
//! carried by the backend configuration.
//!
//! # Feature Flags
//!
//! - `mock`: Expose [`mock`] backends to other crates' tests
//!
//! # Example
//!
//! ```rust,no_run
//! use aera_inference::{embed_query, OpenAIBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let vector = embed_query(&backend, "Hello").await.unwrap();
//! }
//! ```

pub mod embedding;
pub mod gemini;
pub mod image_analysis;
pub mod json;
pub mod openai;
pub mod vision;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use aera_core::*;

pub use embedding::{
    embed_query, select_index_embedder, verify_embedding_width, VisualEmbedder, VisualEmbedding,
};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use image_analysis::{ImageAnalysis, ImageAnalyzer, MultiModelImageAnalyzer};
pub use json::{parse_model_json, parse_tag_list};
pub use openai::{OpenAIBackend, OpenAIConfig};
pub use vision::{VisionBackend, DEFAULT_DESCRIBE_PROMPT};
