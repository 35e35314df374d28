//! Storage seams used by the chat pipeline and the citation graph
//!
//! Services depend on these traits rather than on a concrete database so the
//! Postgres [`Repository`](super::Repository) and the [`InMemoryStore`](super::InMemoryStore)
//! are interchangeable.

use crate::db::models::{CacheEntry, Chunk, NewCacheEntry, NewPaper, Paper, ScoredChunk};
use crate::errors::Result;
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Check that the backing store is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Resolve a paper by internal UUID or arXiv id
    async fn find_paper(&self, reference: &str) -> Result<Option<Paper>>;

    /// Papers matching any of the given arXiv ids. Unknown ids are skipped.
    async fn find_papers_by_arxiv_ids(&self, arxiv_ids: &[String]) -> Result<Vec<Paper>>;

    /// Insert a paper, or refresh its metadata if the arXiv id already exists
    async fn upsert_paper(&self, paper: NewPaper) -> Result<Paper>;

    async fn count_chunks(&self, paper_id: Uuid) -> Result<u64>;

    /// Chunks of `paper_id` among `ids`, returned in the order of `ids`
    async fn chunks_by_ids(&self, paper_id: Uuid, ids: &[Uuid]) -> Result<Vec<Chunk>>;
}

#[async_trait]
pub trait AnswerCache: Send + Sync {
    async fn lookup(&self, paper_id: Uuid, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Atomically bump the hit counter and access time.
    ///
    /// Returns `None` if the entry disappeared in between.
    async fn record_hit(&self, entry_id: Uuid) -> Result<Option<CacheEntry>>;

    /// Persist a new entry. A concurrent writer that already stored the same
    /// (paper, fingerprint) yields [`AppError::CacheWriteConflict`](crate::AppError::CacheWriteConflict).
    async fn store(&self, entry: NewCacheEntry) -> Result<CacheEntry>;
}

#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Chunks of one paper scoring strictly above `min_similarity`, best first
    async fn nearest_chunks(
        &self,
        paper_id: Uuid,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>>;

    /// Dimension of stored chunk embeddings
    fn dimension(&self) -> usize;
}
