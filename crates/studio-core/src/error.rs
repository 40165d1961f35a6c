//! Error types for the studio workspace.

use std::time::Duration;

use thiserror::Error;

use crate::retry::Retryable;

/// Result type alias using StudioError.
pub type Result<T> = std::result::Result<T, StudioError>;

/// Errors that can occur anywhere in the studio pipeline.
#[derive(Error, Debug)]
pub enum StudioError {
    /// Document not found.
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// Invalid argument provided (missing or malformed field).
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Uploaded file has an extension we cannot extract text from.
    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    /// Uploaded file exceeds the configured size cap.
    #[error("File too large: {size} bytes exceeds maximum of {max_size}")]
    FileTooLarge { size: u64, max_size: u64 },

    /// Text extraction from a file or transcript failed.
    #[error("Failed to extract content from {source_name}: {reason}")]
    ExtractionFailed { source_name: String, reason: String },

    /// Provider answered with HTTP 429.
    #[error("Rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider failed (non-success status, or transport failure when
    /// `status` is None).
    #[error("{provider} request failed{}: {message}", status_suffix(.status))]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding model error (malformed or mismatched response).
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Vector store error.
    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    /// Reranking error.
    #[error("Rerank error: {message}")]
    Rerank { message: String },

    /// Chunking error.
    #[error("Chunking error: {message}")]
    Chunking { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StudioError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a vector store error.
    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    /// Create a rerank error.
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank {
            message: message.into(),
        }
    }

    /// Create a chunking error.
    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an extraction error for the named source.
    pub fn extraction(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Transport-level failure talking to a provider (no HTTP status).
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// 429 becomes [`StudioError::RateLimited`], taking the delay from the
    /// `Retry-After` header (seconds) or a `"retry_after": N` hint in the body.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        retry_after_header: Option<&str>,
        body: String,
    ) -> Self {
        let provider = provider.into();
        if status == 429 {
            let retry_after = retry_after_header
                .and_then(|h| h.trim().parse::<u64>().ok())
                .or_else(|| parse_retry_after_hint(&body))
                .map(Duration::from_secs);
            return Self::RateLimited {
                provider,
                retry_after,
                message: body,
            };
        }

        Self::Upstream {
            provider,
            status: Some(status),
            message: body,
        }
    }

    /// Get the stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::VectorStore { .. } => "VECTOR_STORE_ERROR",
            Self::Rerank { .. } => "RERANK_ERROR",
            Self::Chunking { .. } => "CHUNKING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP-style status for service responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument { .. }
            | Self::UnsupportedFileType { .. }
            | Self::FileTooLarge { .. }
            | Self::ExtractionFailed { .. } => 400,
            Self::DocumentNotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::Upstream { .. } => 502,
            _ => 500,
        }
    }
}

impl Retryable for StudioError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Upstream { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500,
            },
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Find a `retry_after` hint (seconds) in a provider error body.
///
/// Accepts `"retry_after":10`, `"retry_after": 10` and `retry_after=10`.
pub fn parse_retry_after_hint(body: &str) -> Option<u64> {
    let idx = body.find("retry_after")?;
    let rest = &body[idx + "retry_after".len()..];
    let rest = rest.trim_start_matches(|c: char| c == '"' || c == ':' || c == '=' || c.is_whitespace());
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
