//! Document upload, listing, processing, search, and signed URLs.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use aera_core::{
    defaults, AnalysisProvider, AnalysisQuality, CreateDocumentRequest, DegradationReason,
    Document, DocumentKind, EnrichedResult, ListDocumentsRequest, SearchType,
};
use aera_ingest::{IngestionReport, ProcessOptions};
use aera_search::clamp_limit;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::owned_document;
use crate::state::AppState;

/// Longest accepted signed-URL lifetime (7 days).
const MAX_SIGNED_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Serialize)]
pub struct DocumentWithReport {
    pub document: Document,
    pub report: IngestionReport,
}

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    data: Option<Vec<u8>>,
    file_name: Option<String>,
    content_type: Option<String>,
    title: Option<String>,
    description: Option<String>,
    workspace_id: Option<Uuid>,
    subject: Option<String>,
    topic: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Object path for a new upload: `{user_id}/{random}` plus a sanitized extension.
fn object_path(user_id: Uuid, file_name: Option<&str>) -> String {
    let extension = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => format!("{}/{}.{}", user_id, Uuid::new_v4(), ext),
        None => format!("{}/{}", user_id, Uuid::new_v4()),
    }
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            form.file_name = field.file_name().map(str::to_string);
            form.content_type = field.content_type().map(str::to_string);
            form.data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?
                    .to_vec(),
            );
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field {}: {}", name, e)))?;
        match name.as_str() {
            "title" => form.title = non_empty(value),
            "description" => form.description = non_empty(value),
            "subject" => form.subject = non_empty(value),
            "topic" => form.topic = non_empty(value),
            "workspace_id" => {
                form.workspace_id = match non_empty(value) {
                    Some(raw) => Some(raw.parse().map_err(|_| {
                        ApiError::BadRequest(format!("Invalid workspace_id: {}", raw))
                    })?),
                    None => None,
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// `POST /api/documents`
///
/// Stores the object, inserts the row, and runs ingestion before responding.
pub async fn upload_document(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_upload_form(multipart).await?;
    let data = form
        .data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No file uploaded. Use field name 'file'.".to_string()))?;

    let mime_type = form
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let title = form
        .title
        .or_else(|| form.file_name.clone())
        .unwrap_or_else(|| "Untitled".to_string());
    let storage_path = object_path(auth.user_id, form.file_name.as_deref());

    state.storage.upload(&storage_path, &data, &mime_type).await?;
    let document_id = state
        .documents
        .insert(CreateDocumentRequest {
            user_id: auth.user_id,
            workspace_id: form.workspace_id,
            title,
            mime_type,
            storage_path,
            size_bytes: data.len() as i64,
            description: form.description,
            subject: form.subject,
            topic: form.topic,
        })
        .await?;

    info!(
        subsystem = "api",
        document_id = %document_id,
        size_bytes = data.len(),
        "Document uploaded"
    );

    let report = state
        .ingestion
        .process(document_id, ProcessOptions::default())
        .await?;
    let document = state.documents.fetch(document_id).await?;

    Ok((StatusCode::CREATED, Json(DocumentWithReport { document, report })))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub workspace_id: Option<Uuid>,
    pub kind: Option<DocumentKind>,
    pub limit: Option<i64>,
}

/// `GET /api/documents`
pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = state
        .documents
        .list(ListDocumentsRequest {
            user_id: auth.user_id,
            workspace_id: query.workspace_id,
            kind: query.kind,
            limit: query.limit.map(|l| l.max(1)),
        })
        .await?;
    Ok(Json(documents))
}

/// `GET /api/documents/:id`
pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(owned_document(&state, auth.user_id, id).await?))
}

/// `DELETE /api/documents/:id`
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let document = owned_document(&state, auth.user_id, id).await?;
    state.documents.delete(id).await?;

    if let Err(e) = state.storage.remove(&document.storage_path).await {
        warn!(
            subsystem = "api",
            document_id = %id,
            storage_path = %document.storage_path,
            error = %e,
            "Document row deleted but object removal failed"
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    pub quality: Option<AnalysisQuality>,
    pub provider: Option<AnalysisProvider>,
}

impl ProcessRequest {
    pub fn options(&self) -> ProcessOptions {
        ProcessOptions {
            provider: self.provider.unwrap_or_default(),
            quality: self.quality.unwrap_or_default(),
        }
    }
}

/// `POST /api/documents/:id/process`
pub async fn process_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ProcessRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    owned_document(&state, auth.user_id, id).await?;
    let options = body.map(|Json(req)| req.options()).unwrap_or_default();
    let report = state.ingestion.process(id, options).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<EnrichedResult>,
    pub search_type: SearchType,
    pub degraded: bool,
    pub reason: Option<DegradationReason>,
}

/// `POST /api/documents/search`
pub async fn search_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(req.limit, defaults::SEARCH_LIMIT);
    let outcome = state
        .retriever
        .search(auth.user_id, &req.query, limit)
        .await?;

    Ok(Json(SearchResponse {
        degraded: outcome.degraded(),
        reason: outcome.reason(),
        search_type: outcome.search_type,
        results: outcome.results,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    pub expires_in: Option<u64>,
}

/// `GET /api/documents/:id/url`
pub async fn signed_url(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let document = owned_document(&state, auth.user_id, id).await?;
    let expires_in = query
        .expires_in
        .unwrap_or(defaults::SIGNED_URL_EXPIRY_SECS)
        .clamp(1, MAX_SIGNED_URL_EXPIRY_SECS);
    let url = state
        .storage
        .create_signed_url(&document.storage_path, expires_in)
        .await?;

    Ok(Json(serde_json::json!({
        "url": url,
        "expires_in": expires_in,
    })))
}
