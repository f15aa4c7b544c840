//! Serving objects behind signed URLs.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct SignatureQuery {
    pub expires: i64,
    pub signature: String,
}

/// `GET /api/storage/*path`
///
/// No bearer token; the URL signature is the credential. The response carries
/// the MIME type recorded on the owning document.
pub async fn serve_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !state
        .storage
        .verify_signature(&path, query.expires, &query.signature)
    {
        return Err(ApiError::Unauthorized(
            "Invalid or expired signature".to_string(),
        ));
    }

    let data = state.storage.download(&path).await?;
    let content_type = state
        .documents
        .find_by_storage_path(&path)
        .await?
        .map(|doc| doc.mime_type)
        .filter(|mime| mime.parse::<HeaderValue>().is_ok())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        data,
    ))
}
