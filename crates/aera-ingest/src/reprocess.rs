//! Sequential re-analysis of every image in a workspace.
//!
//! Images are processed one at a time with a random pause between them to
//! stay under provider rate limits.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use aera_core::{defaults, DocumentKind, DocumentRepository, ListDocumentsRequest, Result};

use crate::orchestrator::{IngestionOrchestrator, ProcessOptions};

/// Counts from one reprocessing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Processed, but through a fallback path.
    pub degraded: usize,
    pub failed: usize,
}

/// Runs the image loop for a workspace.
#[derive(Clone)]
pub struct WorkspaceReprocessor {
    orchestrator: IngestionOrchestrator,
    documents: Arc<dyn DocumentRepository>,
    delay_ms: RangeInclusive<u64>,
}

impl WorkspaceReprocessor {
    pub fn new(orchestrator: IngestionOrchestrator, documents: Arc<dyn DocumentRepository>) -> Self {
        Self {
            orchestrator,
            documents,
            delay_ms: defaults::REPROCESS_DELAY_MIN_MS..=defaults::REPROCESS_DELAY_MAX_MS,
        }
    }

    /// Set the pause range between images, in milliseconds.
    pub fn with_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.delay_ms = min.min(max)..=max.max(min);
        self
    }

    fn next_delay(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.delay_ms.clone());
        Duration::from_millis(ms)
    }

    /// Re-run ingestion for each image document in `workspace_id`.
    ///
    /// A failing image is logged and counted; the loop continues.
    #[instrument(skip_all, fields(
        subsystem = "ingest",
        component = "reprocess",
        workspace_id = %workspace_id,
        user_id = %user_id,
    ))]
    pub async fn reprocess_workspace_images(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        options: ProcessOptions,
    ) -> Result<ReprocessSummary> {
        let images = self
            .documents
            .list(ListDocumentsRequest {
                user_id,
                workspace_id: Some(workspace_id),
                kind: Some(DocumentKind::Image),
                limit: None,
            })
            .await?;

        let mut summary = ReprocessSummary {
            total: images.len(),
            ..Default::default()
        };
        info!(total = summary.total, "Reprocessing workspace images");

        for (index, image) in images.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.next_delay()).await;
            }

            match self.orchestrator.process(image.id, options).await {
                Ok(report) if report.degraded => {
                    summary.degraded += 1;
                }
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    warn!(document_id = %image.id, error = %e, "Image reprocessing failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            degraded = summary.degraded,
            failed = summary.failed,
            "Workspace image reprocessing finished"
        );
        Ok(summary)
    }
}
