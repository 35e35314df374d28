//! SeaORM entity models
//!
//! Note: the pgvector `embedding` column of `paper_chunks` is handled via raw
//! SQL since SeaORM has no native vector type.

mod chat_cache;
mod chunk;
mod paper;

pub use paper::{
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
    Entity as PaperEntity,
    Model as Paper,
};

pub use chunk::{
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
    Entity as ChunkEntity,
    Model as Chunk,
};

pub use chat_cache::{
    ActiveModel as CacheEntryActiveModel,
    Column as CacheEntryColumn,
    Entity as CacheEntryEntity,
    Model as CacheEntry,
};

use uuid::Uuid;

/// Deterministic paper id for an arXiv id
pub fn paper_uuid(arxiv_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, arxiv_id.as_bytes())
}

/// Fields needed to create or refresh a paper
#[derive(Debug, Clone, Default)]
pub struct NewPaper {
    pub arxiv_id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub references: Vec<String>,
    pub cited_by: Vec<String>,
    pub published_date: Option<chrono::DateTime<chrono::Utc>>,
    pub pdf_url: Option<String>,
}

/// Fields needed to persist a generated answer
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub paper_id: Uuid,
    pub question: String,
    pub question_hash: String,
    pub answer: String,
    pub context_chunk_ids: Vec<Uuid>,
    pub model_used: String,
    pub tokens_used: Option<i32>,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,
    pub paper_id: Uuid,
    pub content: String,
    pub chunk_index: i32,
    pub similarity: f32,
}
