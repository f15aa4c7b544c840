//! # aera-search
//!
//! Retrieval and answer synthesis for Aera.
//!
//! This crate provides:
//! - Semantic retrieval through `match_documents`, with a title-substring
//!   fallback whose use is reported as an explicit degradation
//! - Metadata enrichment of retrieval hits
//! - Bounded prompt context assembly
//! - Answer synthesis and the chat-over-documents service
//!
//! ## Example
//!
//! ```ignore
//! use aera_search::{AnswerSynthesizer, ChatService, Retriever};
//!
//! let retriever = Retriever::new(embedder, db_similarity, db_documents);
//! let chat = ChatService::new(retriever, AnswerSynthesizer::new(generator), db_chat);
//! let answer = chat.ask(user_id, "What quarter does this cover?", None).await?;
//! ```

pub mod answer;
pub mod chat;
pub mod context;
pub mod retriever;

// Re-export core types
pub use aera_core::*;

pub use answer::{build_prompt, AnswerSynthesizer, ANSWER_SYSTEM_PROMPT};
pub use chat::{ChatAnswer, ChatService, ContextReference};
pub use context::{assemble_context, assemble_context_with_limit};
pub use retriever::{clamp_limit, RetrievalOutcome, Retriever};
