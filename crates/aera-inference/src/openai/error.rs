//! Mapping of OpenAI-compatible HTTP failures onto Aera errors.

use aera_core::Error;

/// Provider error classes derived from the HTTP status and error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    AuthenticationError,
    RateLimitExceeded,
    ModelNotFound,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Which call path produced the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Embedding,
    Generation,
}

/// Convert a provider failure into an Aera error.
///
/// Throttling always maps to [`Error::RateLimited`] so the backoff policy
/// can recognise it.
pub fn to_aera_error(code: OpenAIErrorCode, kind: CallKind, status: u16, message: &str) -> Error {
    let detail = format!("provider returned {}: {}", status, message);
    match code {
        OpenAIErrorCode::RateLimitExceeded => Error::RateLimited(detail),
        OpenAIErrorCode::AuthenticationError => {
            Error::Config(format!("Authentication failed: {}", detail))
        }
        OpenAIErrorCode::ModelNotFound => Error::Config(format!("Model not found: {}", detail)),
        OpenAIErrorCode::ContextLengthExceeded
        | OpenAIErrorCode::ServerError
        | OpenAIErrorCode::Unknown => match kind {
            CallKind::Embedding => Error::Embedding(detail),
            CallKind::Generation => Error::Inference(detail),
        },
    }
}
