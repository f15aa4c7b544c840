//! Route handlers.

pub mod chat;
pub mod documents;
pub mod health;
pub mod storage;
pub mod workspaces;

use uuid::Uuid;

use aera_core::Document;

use crate::error::ApiError;
use crate::state::AppState;

/// Fetch a document owned by `user_id`. Other users' documents read as missing.
pub(crate) async fn owned_document(
    state: &AppState,
    user_id: Uuid,
    document_id: Uuid,
) -> Result<Document, ApiError> {
    let document = state.documents.fetch(document_id).await?;
    if document.user_id != user_id {
        return Err(ApiError::NotFound(format!(
            "Document {} not found",
            document_id
        )));
    }
    Ok(document)
}
