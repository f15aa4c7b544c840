//! # aera-api
//!
//! HTTP surface for Aera: chat over documents, document upload and
//! ingestion, search, signed object URLs, and workspace reprocessing.
//!
//! [`app`] builds the full router with middleware; the binary in
//! `main.rs` wires it to Postgres, filesystem storage, and the hosted
//! providers.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod telemetry;

use std::time::Duration;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use aera_core::defaults;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::{AppState, Backends};

use handlers::{chat, documents, health, storage, workspaces};
use middleware::MakeRequestUuidV7;

/// Routes without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        // Chat
        .route("/api/chat", post(chat::chat))
        .route(
            "/api/chat/sessions",
            post(chat::create_session).get(chat::list_sessions),
        )
        .route(
            "/api/chat/sessions/:id",
            axum::routing::delete(chat::delete_session),
        )
        .route("/api/chat/sessions/:id/messages", get(chat::list_messages))
        // Documents
        .route(
            "/api/documents",
            post(documents::upload_document).get(documents::list_documents),
        )
        .route("/api/documents/search", post(documents::search_documents))
        .route(
            "/api/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/api/documents/:id/process", post(documents::process_document))
        .route("/api/documents/:id/url", get(documents::signed_url))
        .route("/api/storage/*path", get(storage::serve_object))
        // Workspaces
        .route(
            "/api/workspaces/:id/reprocess-images",
            post(workspaces::reprocess_images),
        )
}

/// The full application: routes plus rate limiting, tracing, request IDs,
/// CORS, and the body size limit.
pub fn app(state: AppState, config: &AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.cors_origins()))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS));

    routes()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .with_state(state)
}
