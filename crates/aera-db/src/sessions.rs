//! Bearer token resolution.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use aera_core::{Error, Result, SessionRepository};

/// SHA-256 hex digest under which a bearer token is stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// PostgreSQL implementation of SessionRepository.
pub struct PgSessionRepository {
    pool: Pool<Postgres>,
}

impl PgSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn resolve_token(&self, token: &str) -> Result<Option<Uuid>> {
        if token.is_empty() {
            return Ok(None);
        }

        sqlx::query_scalar(
            "SELECT user_id FROM user_sessions
             WHERE token_hash = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_token_differs_per_token() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
        assert_eq!(hash_token("token-a").len(), 64);
    }
}
