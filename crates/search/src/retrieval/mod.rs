//! Paper-scoped semantic retrieval
//!
//! Chunks are ranked by cosine similarity (`1 - cosine_distance`) to the
//! question embedding and never cross paper boundaries.

mod vector;

pub use vector::VectorRetriever;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk ID
    pub chunk_id: Uuid,

    /// Paper ID this chunk belongs to
    pub paper_id: Uuid,

    /// Chunk content
    pub content: String,

    /// Chunk index within paper
    pub chunk_index: i32,

    /// Cosine similarity to the query
    pub similarity: f32,
}
