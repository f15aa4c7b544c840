//! # aera-db
//!
//! PostgreSQL persistence for Aera.
//!
//! This crate provides:
//! - Connection pool management
//! - Document, chunk-embedding, and image-embedding repositories
//! - Vector search through the `match_documents` SQL function
//! - Chat history and bearer-token session lookup
//! - Filesystem object storage with HMAC-signed URLs
//! - An in-memory store implementing every trait, for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use aera_db::{Database, DocumentRepository};
//!
//! let db = Database::connect("postgres://localhost/aera").await?;
//! let doc = db.documents.fetch(document_id).await?;
//! ```

pub mod chat;
pub mod documents;
pub mod memory;
pub mod pool;
pub mod search;
pub mod sessions;
pub mod storage;

// Re-export core types
pub use aera_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub use chat::PgChatRepository;
pub use documents::PgDocumentRepository;
pub use memory::InMemoryStore;
pub use pool::{
    create_pool, create_pool_with_config, log_pool_metrics, verify_vector_schema, PoolConfig,
};
pub use search::PgSimilaritySearch;
pub use sessions::{hash_token, PgSessionRepository};
pub use storage::{sign_path, validate_object_path, FilesystemObjectStorage};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub documents: PgDocumentRepository,
    /// `match_documents` RPC.
    pub similarity: PgSimilaritySearch,
    pub chat: PgChatRepository,
    pub sessions: PgSessionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentRepository::new(pool.clone()),
            similarity: PgSimilaritySearch::new(pool.clone()),
            chat: PgChatRepository::new(pool.clone()),
            sessions: PgSessionRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}
