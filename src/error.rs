//! Error types for docqa.

use thiserror::Error;

/// Errors caused by bad input: unusable documents, invalid parameters, empty questions.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("document is empty: {0}")]
    EmptyDocument(String),

    #[error("document could not be read: {source_id}: {reason}")]
    Unreadable { source_id: String, reason: String },

    #[error("document exceeds maximum size: {source_id} ({size} > {max} bytes)")]
    TooLarge {
        source_id: String,
        size: u64,
        max: u64,
    },

    #[error("invalid chunking parameters: {0}")]
    InvalidParameters(String),

    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("no usable documents")]
    NoDocuments,
}

/// Errors related to the embedding backend.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("failed to load model: {0}")]
    LoadError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding has wrong dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count mismatch: sent {expected} texts, got {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

/// Errors raised while building a vector index.
///
/// Queries never fail: an empty, absent, or mismatched index yields no results.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("record {position} has dimension {actual}, index expects {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("record {0} has an empty vector")]
    EmptyVector(usize),
}

/// Errors from the remote language-model endpoint.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("API key not set (expected environment variable {0})")]
    MissingApiKey(String),

    #[error("failed to reach language model endpoint: {0}")]
    ConnectionError(String),

    #[error("language model endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("language model request timed out")]
    Timeout,

    #[error("invalid response from language model: {0}")]
    InvalidResponse(String),

    #[error("language model returned an empty response")]
    EmptyResponse,
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors surfaced by a [`Session`](crate::services::Session) operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_is_transparent() {
        let err: SessionError = ModelError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "embedding has wrong dimension: expected 384, got 3"
        );
    }
}
