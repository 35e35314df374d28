//! Vector similarity search over a [`ChunkIndex`]

use super::RetrievedChunk;
use researchgraph_common::db::ChunkIndex;
use researchgraph_common::errors::{AppError, Result};
use researchgraph_common::metrics;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Vector retriever scoped to a single paper
pub struct VectorRetriever {
    index: Arc<dyn ChunkIndex>,
}

impl VectorRetriever {
    /// Create a new vector retriever
    pub fn new(index: Arc<dyn ChunkIndex>) -> Self {
        Self { index }
    }

    /// Top `k` chunks of `paper_id` with similarity strictly above `min_similarity`,
    /// most similar first.
    ///
    /// An empty result is a normal outcome. A query embedding whose dimension
    /// differs from the index is an error.
    #[instrument(skip(self, query_embedding), fields(dimension = query_embedding.len()))]
    pub async fn search(
        &self,
        paper_id: Uuid,
        query_embedding: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        let expected = self.index.dimension();
        if query_embedding.len() != expected {
            return Err(AppError::EmbeddingDimensionMismatch {
                expected,
                actual: query_embedding.len(),
            });
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut chunks: Vec<RetrievedChunk> = self
            .index
            .nearest_chunks(paper_id, query_embedding, k, min_similarity)
            .await?
            .into_iter()
            // Never hand out another paper's chunks
            .filter(|c| c.paper_id == paper_id && c.similarity > min_similarity)
            .map(|c| RetrievedChunk {
                chunk_id: c.chunk_id,
                paper_id: c.paper_id,
                content: c.content,
                chunk_index: c.chunk_index,
                similarity: c.similarity,
            })
            .collect();

        chunks.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        chunks.truncate(k);

        debug!(results = chunks.len(), "Vector retrieval complete");
        metrics::record_retrieval(chunks.len());

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchgraph_common::db::models::NewPaper;
    use researchgraph_common::db::{InMemoryStore, PaperStore};

    async fn store_with_papers() -> (Arc<InMemoryStore>, Uuid, Uuid) {
        let store = Arc::new(InMemoryStore::new(3));
        let a = store
            .upsert_paper(NewPaper {
                arxiv_id: "1706.03762".into(),
                title: "Attention Is All You Need".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id;
        let b = store
            .upsert_paper(NewPaper {
                arxiv_id: "1512.03385".into(),
                title: "Deep Residual Learning".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id;

        store.add_chunk(a, 0, "self-attention", vec![1.0, 0.0, 0.0]).await.unwrap();
        store.add_chunk(a, 1, "multi-head", vec![0.8, 0.6, 0.0]).await.unwrap();
        store.add_chunk(a, 2, "positional encoding", vec![0.0, 0.0, 1.0]).await.unwrap();
        store.add_chunk(b, 0, "residual block", vec![1.0, 0.0, 0.0]).await.unwrap();

        (store, a, b)
    }

    #[tokio::test]
    async fn test_results_scoped_and_ordered() {
        let (store, a, _) = store_with_papers().await;
        let retriever = VectorRetriever::new(store);

        let results = retriever.search(a, &[1.0, 0.1, 0.0], 5, 0.0).await.unwrap();

        assert!(results.iter().all(|c| c.paper_id == a));
        assert_eq!(results[0].content, "self-attention");
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        // Orthogonal chunk scores 0 and is not strictly above the threshold
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_truncates_to_k() {
        let (store, a, _) = store_with_papers().await;
        let retriever = VectorRetriever::new(store);

        let results = retriever.search(a, &[1.0, 1.0, 1.0], 1, -1.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(retriever.search(a, &[1.0, 1.0, 1.0], 0, -1.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_when_nothing_above_threshold() {
        let (store, a, _) = store_with_papers().await;
        let retriever = VectorRetriever::new(store);

        let results = tokio_test::assert_ok!(retriever.search(a, &[0.0, -1.0, 0.0], 5, 0.5).await);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let (store, a, _) = store_with_papers().await;
        let retriever = VectorRetriever::new(store);

        let err = retriever.search(a, &[1.0, 0.0], 5, 0.0).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::EmbeddingDimensionMismatch { expected: 3, actual: 2 }
        ));
    }
}
