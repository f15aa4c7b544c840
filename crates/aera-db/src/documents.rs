//! Document repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use aera_core::{
    ChunkEmbedding, CreateDocumentRequest, Document, DocumentAnalysisUpdate, DocumentKind,
    DocumentMetadata, DocumentRepository, Error, ImageEmbedding, ListDocumentsRequest, Result,
};

use crate::escape_like;

const DOCUMENT_COLUMNS: &str = "id, user_id, workspace_id, title, mime_type, storage_path, \
     size_bytes, description, subject, topic, tags, ai_summary, detailed_analysis, \
     searchable_text, analysis_model, embedding, processed_at, created_at, updated_at";

/// SQL predicate matching the MIME types of a document kind.
///
/// Mirrors [`DocumentKind::from_mime`].
fn kind_clause(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Image => "lower(mime_type) LIKE 'image/%'",
        DocumentKind::Video => "lower(mime_type) LIKE 'video/%'",
        DocumentKind::Text => {
            "(lower(mime_type) LIKE 'text/%' OR split_part(lower(mime_type), ';', 1) \
             IN ('application/pdf', 'application/json', 'application/markdown'))"
        }
        DocumentKind::Other => {
            "NOT (lower(mime_type) LIKE 'image/%' OR lower(mime_type) LIKE 'video/%' \
             OR lower(mime_type) LIKE 'text/%' OR split_part(lower(mime_type), ';', 1) \
             IN ('application/pdf', 'application/json', 'application/markdown'))"
        }
    }
}

fn document_from_row(row: &PgRow) -> Document {
    Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        workspace_id: row.get("workspace_id"),
        title: row.get("title"),
        mime_type: row.get("mime_type"),
        storage_path: row.get("storage_path"),
        size_bytes: row.get("size_bytes"),
        description: row.get("description"),
        subject: row.get("subject"),
        topic: row.get("topic"),
        tags: row.get("tags"),
        ai_summary: row.get("ai_summary"),
        detailed_analysis: row.get("detailed_analysis"),
        searchable_text: row.get("searchable_text"),
        analysis_model: row.get("analysis_model"),
        embedding: row.get("embedding"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// PostgreSQL implementation of DocumentRepository.
pub struct PgDocumentRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, req: CreateDocumentRequest) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO documents (id, user_id, workspace_id, title, mime_type, storage_path,
                                    size_bytes, description, subject, topic, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
        )
        .bind(id)
        .bind(req.user_id)
        .bind(req.workspace_id)
        .bind(&req.title)
        .bind(&req.mime_type)
        .bind(&req.storage_path)
        .bind(req.size_bytes)
        .bind(&req.description)
        .bind(&req.subject)
        .bind(&req.topic)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Document> {
        let query = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::DocumentNotFound(id))?;

        Ok(document_from_row(&row))
    }

    async fn find_by_storage_path(&self, storage_path: &str) -> Result<Option<Document>> {
        let query = format!(
            "SELECT {} FROM documents WHERE storage_path = $1 LIMIT 1",
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(storage_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(document_from_row))
    }

    async fn list(&self, req: ListDocumentsRequest) -> Result<Vec<Document>> {
        let mut query = format!(
            "SELECT {} FROM documents WHERE user_id = $1 AND ($2::uuid IS NULL OR workspace_id = $2)",
            DOCUMENT_COLUMNS
        );
        if let Some(kind) = req.kind {
            query.push_str(" AND ");
            query.push_str(kind_clause(kind));
        }
        query.push_str(" ORDER BY created_at DESC LIMIT $3");

        let limit = req.limit.unwrap_or(100).clamp(1, 1000);
        let rows = sqlx::query(&query)
            .bind(req.user_id)
            .bind(req.workspace_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn apply_analysis(&self, id: Uuid, update: DocumentAnalysisUpdate) -> Result<()> {
        debug!(
            subsystem = "db",
            component = "documents",
            op = "apply_analysis",
            document_id = %id,
            fields = ?update.written_fields(),
            "Writing analysis fields"
        );

        let result = sqlx::query(
            "UPDATE documents SET
                 embedding = COALESCE($2, embedding),
                 description = COALESCE($3, description),
                 tags = COALESCE($4, tags),
                 ai_summary = COALESCE($5, ai_summary),
                 detailed_analysis = COALESCE($6, detailed_analysis),
                 searchable_text = COALESCE($7, searchable_text),
                 analysis_model = COALESCE($8, analysis_model),
                 processed_at = $9,
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.embedding)
        .bind(update.description)
        .bind(update.tags)
        .bind(update.ai_summary)
        .bind(update.detailed_analysis)
        .bind(update.searchable_text)
        .bind(update.analysis_model)
        .bind(update.processed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn replace_chunk_embeddings(
        &self,
        document_id: Uuid,
        chunks: Vec<ChunkEmbedding>,
        model: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM document_embeddings WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let now = Utc::now();
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_embeddings (id, document_id, chunk_index, content, embedding, model, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::now_v7())
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .bind(model)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn upsert_image_embedding(&self, embedding: ImageEmbedding) -> Result<()> {
        sqlx::query(
            "INSERT INTO image_embeddings (id, document_id, frame_index, embedding, description, model)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (document_id, frame_index) DO UPDATE SET
                 embedding = EXCLUDED.embedding,
                 description = EXCLUDED.description,
                 model = EXCLUDED.model,
                 created_at = now()",
        )
        .bind(Uuid::now_v7())
        .bind(embedding.document_id)
        .bind(embedding.frame_index)
        .bind(&embedding.embedding)
        .bind(&embedding.description)
        .bind(&embedding.model)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn search_titles(
        &self,
        user_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let pattern = format!("%{}%", escape_like(query));
        let sql = format!(
            "SELECT {} FROM documents
             WHERE user_id = $1 AND title ILIKE $2 ESCAPE '\\'
             ORDER BY created_at DESC
             LIMIT $3",
            DOCUMENT_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn fetch_metadata(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, DocumentMetadata>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT id, workspace_id, title, subject, topic, created_at
             FROM documents WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let meta = DocumentMetadata {
                    id: row.get("id"),
                    workspace_id: row.get("workspace_id"),
                    title: row.get("title"),
                    subject: row.get("subject"),
                    topic: row.get("topic"),
                    created_at: row.get("created_at"),
                };
                (meta.id, meta)
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_clause_matches_kind() {
        assert!(kind_clause(DocumentKind::Image).contains("image/%"));
        assert!(kind_clause(DocumentKind::Video).contains("video/%"));
        assert!(kind_clause(DocumentKind::Text).contains("application/pdf"));
        assert!(kind_clause(DocumentKind::Other).starts_with("NOT"));
    }

    #[test]
    fn test_document_columns_include_analysis_fields() {
        for column in ["tags", "ai_summary", "detailed_analysis", "embedding", "processed_at"] {
            assert!(DOCUMENT_COLUMNS.contains(column), "missing {}", column);
        }
    }
}
