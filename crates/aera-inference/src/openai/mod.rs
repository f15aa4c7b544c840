//! OpenAI-compatible inference backend.
//!
//! Mistral's hosted API speaks this protocol, so it serves text embeddings,
//! chat completions, and vision (via `image_url` data-URL content parts).
//!
//! # Example
//!
//! ```rust,no_run
//! use aera_inference::openai::OpenAIBackend;
//! use aera_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let texts = vec!["Hello, world!".to_string()];
//!     let vectors = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_aera_error, CallKind, OpenAIErrorCode};
pub use types::*;
