//! Workspace-wide operations.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::documents::ProcessRequest;
use crate::state::AppState;

/// `POST /api/workspaces/:id/reprocess-images`
///
/// Starts the sequential reprocessing loop in the background and returns 202.
pub async fn reprocess_images(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
    body: Option<Json<ProcessRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let options = body.map(|Json(req)| req.options()).unwrap_or_default();
    let reprocessor = state.reprocessor.clone();
    let user_id = auth.user_id;

    tokio::spawn(async move {
        match reprocessor
            .reprocess_workspace_images(workspace_id, user_id, options)
            .await
        {
            Ok(summary) => info!(
                subsystem = "api",
                workspace_id = %workspace_id,
                total = summary.total,
                failed = summary.failed,
                "Workspace reprocessing finished"
            ),
            Err(e) => error!(
                subsystem = "api",
                workspace_id = %workspace_id,
                error = %e,
                "Workspace reprocessing aborted"
            ),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "workspace_id": workspace_id,
        })),
    ))
}
