use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error as ThisError;

/// Classifies errors that may succeed on a fresh connection.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, ThisError)]
pub enum GatewayError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("{family} not found for id: {id}")]
    UnknownBackend { family: &'static str, id: String },

    #[error("invalid request body")]
    InvalidBody,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported {family} type: {scheme}")]
    UnsupportedScheme { family: &'static str, scheme: String },

    #[error("{0}")]
    Sql(String),

    #[error("multiple statements not supported")]
    MultipleStatements,

    #[error(
        "parameter count mismatch: statement has {placeholders} placeholders but {args} arguments provided"
    )]
    ParameterCountMismatch { placeholders: usize, args: usize },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("presigned URLs not supported for local storage")]
    PresignedUnsupported,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("object storage error: {0}")]
    ObjectStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        // The status code is the protocol-level discriminator; the body carries
        // a human-readable message and nothing else.
        let status = match self {
            GatewayError::MissingHeader(_)
            | GatewayError::UnknownBackend { .. }
            | GatewayError::InvalidBody => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Substrings of driver error messages that indicate a broken connection.
/// Matched case-insensitively against the rendered error.
const RETRYABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "bad connection",
    "timeout",
    "eof",
    "network unreachable",
];

impl IsRetryable for GatewayError {
    fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Database(_) | GatewayError::Redis(_) | GatewayError::Backend(_) => {
                let rendered = self.to_string().to_lowercase();
                RETRYABLE_PATTERNS.iter().any(|p| rendered.contains(p))
            }
            _ => false,
        }
    }
}
