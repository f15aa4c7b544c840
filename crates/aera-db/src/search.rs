//! Vector similarity search via the `match_documents` SQL function.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use aera_core::{Error, Result, SearchMatch, SimilaritySearch, Vector};

/// Calls `match_documents(query_embedding, match_count, p_user_id)`.
pub struct PgSimilaritySearch {
    pool: Pool<Postgres>,
}

impl PgSimilaritySearch {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilaritySearch for PgSimilaritySearch {
    async fn match_documents(
        &self,
        query_embedding: &Vector,
        match_count: i64,
        user_id: Uuid,
    ) -> Result<Vec<SearchMatch>> {
        let start = Instant::now();
        let match_count = i32::try_from(match_count)
            .map_err(|_| Error::InvalidInput(format!("match_count out of range: {}", match_count)))?;

        let rows = sqlx::query(
            "SELECT document_id, content, similarity FROM match_documents($1, $2, $3)",
        )
        .bind(query_embedding)
        .bind(match_count)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let matches: Vec<SearchMatch> = rows
            .into_iter()
            .map(|row| SearchMatch {
                document_id: row.get("document_id"),
                content: row.get("content"),
                similarity: row.get::<f64, _>("similarity") as f32,
            })
            .collect();

        debug!(
            subsystem = "db",
            component = "similarity",
            op = "match_documents",
            user_id = %user_id,
            result_count = matches.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Similarity search complete"
        );

        Ok(matches)
    }
}
