//! # aera-ingest
//!
//! Document ingestion for Aera.
//!
//! This crate provides:
//! - The ingestion orchestrator: MIME classification and the image, text,
//!   video, and fallback branches, with per-field failure isolation
//! - Tag and summary derivation with a keyword fallback
//! - Sequential, rate-limited reprocessing of a workspace's images
//!
//! ## Example
//!
//! ```ignore
//! use aera_ingest::{IngestionOrchestrator, ProcessOptions};
//!
//! let report = orchestrator.process(document_id, ProcessOptions::default()).await?;
//! if report.degraded {
//!     println!("fell back: {:?}", report.reason);
//! }
//! ```

pub mod orchestrator;
pub mod reprocess;
pub mod tagging;

// Re-export core types
pub use aera_core::*;

pub use orchestrator::{
    ChunkingConfig, FieldFailure, IngestionOrchestrator, IngestionReport, ProcessOptions,
};
pub use reprocess::{ReprocessSummary, WorkspaceReprocessor};
pub use tagging::{keyword_tags, TagSource, Tagger};
