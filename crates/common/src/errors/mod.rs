//! Error types for ResearchGraph services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Resource errors (4xxx)
    PaperNotFound,
    NoPaperContent,
    NoDiscoveryResults,

    // Conflict errors (5xxx)
    CacheWriteConflict,

    // Rate limiting (6xxx)
    RateLimited,
    QuotaExceeded,

    // Storage errors (7xxx)
    DatabaseError,
    StoreUnavailable,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    EmbeddingTimeout,
    GenerationFailure,
    LiteratureSearchError,

    // Internal errors (9xxx)
    InternalError,
    EmbeddingDimensionMismatch,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::PaperNotFound => 4002,
            ErrorCode::NoPaperContent => 4003,
            ErrorCode::NoDiscoveryResults => 4004,

            ErrorCode::CacheWriteConflict => 5001,

            ErrorCode::RateLimited => 6001,
            ErrorCode::QuotaExceeded => 6002,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::StoreUnavailable => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::EmbeddingTimeout => 8003,
            ErrorCode::GenerationFailure => 8004,
            ErrorCode::LiteratureSearchError => 8005,

            ErrorCode::InternalError => 9001,
            ErrorCode::EmbeddingDimensionMismatch => 9002,
            ErrorCode::ConfigurationError => 9003,
            ErrorCode::SerializationError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Resource errors
    #[error("Paper '{id}' not found")]
    PaperNotFound { id: String },

    #[error("No content found for paper '{id}'")]
    NoPaperContent { id: String },

    #[error("No papers found for topic '{topic}'")]
    NoDiscoveryResults { topic: String },

    // Conflict errors
    #[error("Answer already cached for paper {paper_id} and question {question_hash}")]
    CacheWriteConflict {
        paper_id: String,
        question_hash: String,
    },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    #[error("Model quota exceeded: {message}")]
    QuotaExceeded { message: String },

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Answer generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("Literature search failed: {message}")]
    LiteratureSearch { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PaperNotFound { .. } => ErrorCode::PaperNotFound,
            AppError::NoPaperContent { .. } => ErrorCode::NoPaperContent,
            AppError::NoDiscoveryResults { .. } => ErrorCode::NoDiscoveryResults,
            AppError::CacheWriteConflict { .. } => ErrorCode::CacheWriteConflict,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            AppError::Database(_) | AppError::Sqlx(_) => ErrorCode::DatabaseError,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::GenerationFailed { .. } => ErrorCode::GenerationFailure,
            AppError::LiteratureSearch { .. } => ErrorCode::LiteratureSearchError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::EmbeddingDimensionMismatch { .. } => ErrorCode::EmbeddingDimensionMismatch,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::PaperNotFound { .. }
            | AppError::NoPaperContent { .. }
            | AppError::NoDiscoveryResults { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::CacheWriteConflict { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } | AppError::QuotaExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::Sqlx(_)
            | AppError::EmbeddingDimensionMismatch { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. }
            | AppError::GenerationFailed { .. }
            | AppError::LiteratureSearch { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::EmbeddingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message safe to show to API callers.
    ///
    /// Client errors describe themselves; server-side failures get a fixed
    /// text so store or upstream details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::QuotaExceeded { .. } => {
                "Model rate limit reached. Please wait about 60 seconds and try again.".to_string()
            }
            AppError::EmbeddingError { .. }
            | AppError::EmbeddingTimeout { .. }
            | AppError::GenerationFailed { .. }
            | AppError::HttpClient(_) => {
                "Could not generate an answer, please try again.".to_string()
            }
            AppError::LiteratureSearch { .. } => {
                "Literature search is unavailable, please try again.".to_string()
            }
            AppError::StoreUnavailable { .. } => "Service temporarily unavailable.".to_string(),
            _ if self.is_server_error() => "Internal server error.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.public_message(),
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::StoreUnavailable {
            message: format!("Migration failed: {}", err),
        }
    }
}
