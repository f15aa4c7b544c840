//! aera-api - HTTP API server for Aera

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use aera_api::telemetry::{self, LogSettings};
use aera_api::{app, AppConfig, AppState, Backends};
use aera_core::{defaults, EmbeddingBackend, GenerationBackend};
use aera_db::{
    log_pool_metrics, verify_vector_schema, Database, FilesystemObjectStorage, PgChatRepository,
    PgDocumentRepository, PgSessionRepository, PgSimilaritySearch, PoolConfig,
};
use aera_inference::{
    select_index_embedder, verify_embedding_width, GeminiBackend, MultiModelImageAnalyzer,
    OpenAIBackend, VisionBackend, VisualEmbedder,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_settings = LogSettings::from_env();
    let _log_guard = telemetry::init(&log_settings);
    info!(
        log_format = ?log_settings.format,
        destination = %log_settings.destination(),
        "Logging initialized"
    );

    let config = AppConfig::from_env();

    // Database
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    verify_vector_schema(&db.pool).await?;
    log_pool_metrics(&db.pool);
    let pool = db.pool.clone();

    // Object storage
    let storage = FilesystemObjectStorage::new(
        &config.storage_path,
        config.storage_signing_secret.as_bytes().to_vec(),
        &config.public_base_url,
    );
    storage.validate().await?;
    info!(storage_path = %config.storage_path, "Object storage ready");

    // Providers
    let mistral = OpenAIBackend::from_env()?;
    let gemini = GeminiBackend::from_env()?;
    if !mistral.is_configured() {
        warn!("MISTRAL_API_KEY not set; chat and tagging will fail");
    }
    if !gemini.is_configured() {
        warn!("GEMINI_API_KEY not set; image analysis falls back to Mistral vision");
    }

    let analyzer = MultiModelImageAnalyzer::from_backends(
        Some(gemini.clone()),
        Some(mistral.clone()),
    );
    if !analyzer.has_provider() {
        warn!("No vision provider configured; images are indexed by title only");
    }

    let mistral = Arc::new(mistral);
    let gemini = Arc::new(gemini);

    // One embedding space for documents, queries and image descriptions.
    let mut candidates: Vec<Arc<dyn EmbeddingBackend>> = Vec::new();
    if gemini.is_configured() {
        candidates.push(gemini.clone());
    }
    if mistral.is_configured() {
        candidates.push(mistral.clone());
    }
    let embedder = select_index_embedder(&candidates, defaults::EMBED_DIMENSION)?;
    match verify_embedding_width(embedder.as_ref(), defaults::EMBED_DIMENSION).await {
        Ok(()) => {}
        Err(e @ aera_core::Error::Config(_)) => return Err(e.into()),
        Err(e) => warn!(
            error = %e,
            model = embedder.model_name(),
            "Embedding width check failed; continuing"
        ),
    }

    let vision = if gemini.is_configured() {
        gemini.clone() as Arc<dyn VisionBackend>
    } else {
        mistral.clone() as Arc<dyn VisionBackend>
    };

    let state = AppState::new(Backends {
        documents: Arc::new(PgDocumentRepository::new(pool.clone())),
        similarity: Arc::new(PgSimilaritySearch::new(pool.clone())),
        chat: Arc::new(PgChatRepository::new(pool.clone())),
        sessions: Arc::new(PgSessionRepository::new(pool)),
        storage: Arc::new(storage),
        embedder: embedder.clone(),
        generator: mistral as Arc<dyn GenerationBackend>,
        visual_embedder: VisualEmbedder::new(vision, embedder),
        analyzer: Arc::new(analyzer),
    })
    .with_reprocess_delay_ms(config.reprocess_delay_min_ms, config.reprocess_delay_max_ms);

    let state = if config.rate_limit_enabled {
        info!(
            requests = config.rate_limit_requests,
            period_secs = config.rate_limit_period_secs,
            "Rate limiting enabled"
        );
        state.with_rate_limit(config.rate_limit_requests, config.rate_limit_period_secs)
    } else {
        state
    };

    let router = app(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
