//! # aera-core
//!
//! Core types, traits, and abstractions for the Aera workspace.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other Aera crates depend on, plus the pure algorithms shared
//! between them (chunking, vector math, backoff).

pub mod chunking;
pub mod defaults;
pub mod error;
pub mod models;
pub mod retry;
pub mod traits;
pub mod vector;

// Re-export commonly used types at crate root
pub use chunking::{chunk_text, chunk_text_default, DocumentChunk};
pub use error::{Error, Result};
pub use models::*;
pub use retry::BackoffPolicy;
pub use traits::*;
pub use vector::{cosine_similarity, ensure_dimension};
