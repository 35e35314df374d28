//! In-memory implementation of the store traits
//!
//! Used by unit tests and local demos. Follows the same contracts as the
//! Postgres repository, including the per-paper cache uniqueness rule.

use crate::db::models::{
    paper_uuid, CacheEntry, Chunk, NewCacheEntry, NewPaper, Paper, ScoredChunk,
};
use crate::db::store::{AnswerCache, ChunkIndex, PaperStore};
use crate::embeddings::cosine_similarity;
use crate::errors::{AppError, Result};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    papers: HashMap<Uuid, Paper>,
    chunks: Vec<(Chunk, Vec<f32>)>,
    cache: HashMap<Uuid, CacheEntry>,
}

pub struct InMemoryStore {
    state: RwLock<State>,
    dimension: usize,
}

impl InMemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            state: RwLock::new(State::default()),
            dimension,
        }
    }

    /// Attach a chunk with its embedding to a paper
    pub async fn add_chunk(
        &self,
        paper_id: Uuid,
        chunk_index: i32,
        content: &str,
        embedding: Vec<f32>,
    ) -> Result<Uuid> {
        if embedding.len() != self.dimension {
            return Err(AppError::EmbeddingDimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let mut state = self.state.write().await;
        let paper = state.papers.get_mut(&paper_id).ok_or_else(|| AppError::PaperNotFound {
            id: paper_id.to_string(),
        })?;
        paper.chunk_count += 1;
        paper.is_processed = true;

        let chunk = Chunk {
            id: Uuid::new_v4(),
            paper_id,
            content: content.to_string(),
            chunk_index,
            page_number: None,
            section_title: None,
            token_count: None,
            created_at: chrono::Utc::now().into(),
        };
        let id = chunk.id;
        state.chunks.push((chunk, embedding));
        Ok(id)
    }

    /// All cache entries stored for a paper
    pub async fn cache_entries(&self, paper_id: Uuid) -> Vec<CacheEntry> {
        self.state
            .read()
            .await
            .cache
            .values()
            .filter(|e| e.paper_id == paper_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PaperStore for InMemoryStore {
    async fn find_paper(&self, reference: &str) -> Result<Option<Paper>> {
        let state = self.state.read().await;
        let by_id = Uuid::parse_str(reference)
            .ok()
            .and_then(|id| state.papers.get(&id));
        Ok(by_id
            .or_else(|| state.papers.values().find(|p| p.arxiv_id == reference))
            .cloned())
    }

    async fn find_papers_by_arxiv_ids(&self, arxiv_ids: &[String]) -> Result<Vec<Paper>> {
        let state = self.state.read().await;
        Ok(state
            .papers
            .values()
            .filter(|p| arxiv_ids.contains(&p.arxiv_id))
            .cloned()
            .collect())
    }

    async fn upsert_paper(&self, paper: NewPaper) -> Result<Paper> {
        let now = chrono::Utc::now();
        let mut state = self.state.write().await;

        let existing = state
            .papers
            .values_mut()
            .find(|p| p.arxiv_id == paper.arxiv_id);

        if let Some(existing) = existing {
            existing.title = paper.title;
            existing.abstract_text = paper.abstract_text;
            existing.authors = serde_json::json!(paper.authors);
            existing.references = serde_json::json!(paper.references);
            existing.updated_at = now.into();
            return Ok(existing.clone());
        }

        let model = Paper {
            id: paper_uuid(&paper.arxiv_id),
            arxiv_id: paper.arxiv_id,
            title: paper.title,
            abstract_text: paper.abstract_text,
            authors: serde_json::json!(paper.authors),
            categories: serde_json::json!(paper.categories),
            references: serde_json::json!(paper.references),
            cited_by: serde_json::json!(paper.cited_by),
            published_date: paper.published_date.map(Into::into),
            pdf_url: paper.pdf_url,
            is_processed: false,
            chunk_count: 0,
            created_at: now.into(),
            updated_at: now.into(),
        };
        state.papers.insert(model.id, model.clone());
        Ok(model)
    }

    async fn count_chunks(&self, paper_id: Uuid) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .chunks
            .iter()
            .filter(|(c, _)| c.paper_id == paper_id)
            .count() as u64)
    }

    async fn chunks_by_ids(&self, paper_id: Uuid, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .chunks
                    .iter()
                    .find(|(c, _)| c.id == *id && c.paper_id == paper_id)
                    .map(|(c, _)| c.clone())
            })
            .collect())
    }
}

#[async_trait]
impl AnswerCache for InMemoryStore {
    async fn lookup(&self, paper_id: Uuid, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let state = self.state.read().await;
        Ok(state
            .cache
            .values()
            .find(|e| e.paper_id == paper_id && e.question_hash == fingerprint.as_str())
            .cloned())
    }

    async fn record_hit(&self, entry_id: Uuid) -> Result<Option<CacheEntry>> {
        let mut state = self.state.write().await;
        Ok(state.cache.get_mut(&entry_id).map(|entry| {
            entry.hit_count += 1;
            entry.last_accessed_at = chrono::Utc::now().into();
            entry.clone()
        }))
    }

    async fn store(&self, entry: NewCacheEntry) -> Result<CacheEntry> {
        let mut state = self.state.write().await;

        let duplicate = state
            .cache
            .values()
            .any(|e| e.paper_id == entry.paper_id && e.question_hash == entry.question_hash);
        if duplicate {
            return Err(AppError::CacheWriteConflict {
                paper_id: entry.paper_id.to_string(),
                question_hash: entry.question_hash,
            });
        }

        let now = chrono::Utc::now();
        let ids: Vec<String> = entry.context_chunk_ids.iter().map(Uuid::to_string).collect();
        let stored = CacheEntry {
            id: Uuid::new_v4(),
            paper_id: entry.paper_id,
            question: entry.question,
            question_hash: entry.question_hash,
            answer: entry.answer,
            context_chunk_ids: serde_json::json!(ids),
            model_used: Some(entry.model_used),
            tokens_used: entry.tokens_used,
            hit_count: 0,
            created_at: now.into(),
            last_accessed_at: now.into(),
        };
        state.cache.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl ChunkIndex for InMemoryStore {
    async fn nearest_chunks(
        &self,
        paper_id: Uuid,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().await;
        let mut scored: Vec<ScoredChunk> = state
            .chunks
            .iter()
            .filter(|(c, _)| c.paper_id == paper_id)
            .map(|(c, vector)| ScoredChunk {
                chunk_id: c.id,
                paper_id: c.paper_id,
                content: c.content.clone(),
                chunk_index: c.chunk_index,
                similarity: cosine_similarity(embedding, vector),
            })
            .filter(|s| s.similarity > min_similarity)
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);
        Ok(scored)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn paper(arxiv_id: &str) -> NewPaper {
        NewPaper {
            arxiv_id: arxiv_id.to_string(),
            title: format!("Paper {}", arxiv_id),
            ..Default::default()
        }
    }

    fn entry(paper_id: Uuid, question: &str) -> NewCacheEntry {
        NewCacheEntry {
            paper_id,
            question: question.to_string(),
            question_hash: Fingerprint::of(question).to_string(),
            answer: "answer".to_string(),
            context_chunk_ids: vec![],
            model_used: "mock".to_string(),
            tokens_used: Some(10),
        }
    }

    #[tokio::test]
    async fn test_find_by_uuid_or_arxiv_id() {
        let store = InMemoryStore::new(3);
        let stored = store.upsert_paper(paper("1706.03762")).await.unwrap();

        let by_arxiv = store.find_paper("1706.03762").await.unwrap().unwrap();
        let by_uuid = store.find_paper(&stored.id.to_string()).await.unwrap().unwrap();
        assert_eq!(by_arxiv.id, by_uuid.id);
        assert!(store.find_paper("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_id_and_cited_by() {
        let store = InMemoryStore::new(3);
        let mut first = paper("1512.03385");
        first.cited_by = vec!["1706.03762".to_string()];
        let created = store.upsert_paper(first).await.unwrap();

        let mut second = paper("1512.03385");
        second.title = "Deep Residual Learning".to_string();
        let updated = store.upsert_paper(second).await.unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.title, "Deep Residual Learning");
        assert_eq!(updated.cited_by(), vec!["1706.03762".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_store_persists_one_entry() {
        let store = Arc::new(InMemoryStore::new(3));
        let paper_id = store.upsert_paper(paper("1706.03762")).await.unwrap().id;

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.store(entry(paper_id, "What is attention?")).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.store(entry(paper_id, "what is ATTENTION? ")).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::CacheWriteConflict { .. })))
            .count();

        assert_eq!(ok, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.cache_entries(paper_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_hit_increments() {
        let store = InMemoryStore::new(3);
        let paper_id = store.upsert_paper(paper("1706.03762")).await.unwrap().id;
        let stored = store.store(entry(paper_id, "q")).await.unwrap();

        store.record_hit(stored.id).await.unwrap();
        let hit = store.record_hit(stored.id).await.unwrap().unwrap();
        assert_eq!(hit.hit_count, 2);
        assert!(store.record_hit(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_are_all_counted() {
        const HITS: usize = 32;

        let store = Arc::new(InMemoryStore::new(3));
        let paper_id = store.upsert_paper(paper("1706.03762")).await.unwrap().id;
        let entry_id = store.store(entry(paper_id, "q")).await.unwrap().id;

        let tasks: Vec<_> = (0..HITS)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.record_hit(entry_id).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }

        let entries = store.cache_entries(paper_id).await;
        assert_eq!(entries[0].hit_count, HITS as i32);
    }

    #[tokio::test]
    async fn test_nearest_chunks_scoped_to_paper() {
        let store = InMemoryStore::new(3);
        let a = store.upsert_paper(paper("a")).await.unwrap().id;
        let b = store.upsert_paper(paper("b")).await.unwrap().id;

        store.add_chunk(a, 0, "a-near", vec![1.0, 0.0, 0.0]).await.unwrap();
        store.add_chunk(a, 1, "a-far", vec![0.0, 1.0, 0.0]).await.unwrap();
        store.add_chunk(b, 0, "b-exact", vec![1.0, 0.0, 0.0]).await.unwrap();

        let hits = store.nearest_chunks(a, &[1.0, 0.1, 0.0], 5, 0.0).await.unwrap();
        assert!(hits.iter().all(|h| h.paper_id == a));
        assert_eq!(hits[0].content, "a-near");
    }

    #[tokio::test]
    async fn test_add_chunk_rejects_wrong_dimension() {
        let store = InMemoryStore::new(3);
        let a = store.upsert_paper(paper("a")).await.unwrap().id;
        let err = store.add_chunk(a, 0, "x", vec![1.0, 0.0]).await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingDimensionMismatch { expected: 3, actual: 2 }));
    }
}
