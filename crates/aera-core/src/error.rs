//! The error type shared by every Aera crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// A provider failed to return usable vectors.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Chat, vision, or analysis call failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Provider throttling: HTTP 429 or an "overloaded" reply.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Both similarity search and the text fallback failed.
    #[error("Search error: {0}")]
    Search(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing API key, bad URL, absent schema objects.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected at the boundary: empty question, empty upload, wrong dimension.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for [`Error::RateLimited`] and for any message containing a
    /// throttling word such as "rate", "overloaded", or "429".
    pub fn is_rate_limited(&self) -> bool {
        if matches!(self, Error::RateLimited(_)) {
            return true;
        }
        let msg = self.to_string().to_lowercase();
        msg.split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| {
                matches!(
                    word,
                    "rate" | "ratelimit" | "ratelimited" | "overloaded" | "429"
                )
            })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
