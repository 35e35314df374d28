//! ResearchGraph Common Library
//!
//! Shared code for the ResearchGraph services including:
//! - Configuration management
//! - Error types and handling
//! - Database models, store traits and the Postgres repository
//! - Embedding and chat-model client abstractions
//! - Question fingerprinting for the answer cache
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod fingerprint;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{AnswerCache, ChunkIndex, InMemoryStore, PaperStore, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use fingerprint::Fingerprint;
pub use llm::ChatModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name reported by health checks
pub const APP_NAME: &str = "ResearchGraph";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Default embedding dimension, must match `paper_chunks.embedding`
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
