//! Chat orchestration
//!
//! A request moves through a fixed sequence of steps:
//!
//! 1. validate the question and compute its fingerprint
//! 2. resolve the paper
//! 3. check the answer cache (a hit ends the request, no model is called)
//! 4. embed the question and retrieve evidence chunks
//! 5. generate the answer
//! 6. store the answer in the cache (best effort)
//!
//! Each step returns a `Result`; the first hard error ends the request and
//! nothing is written to the cache.

use crate::generator::AnswerGenerator;
use researchgraph_common::db::models::{NewCacheEntry, Paper};
use researchgraph_common::db::{AnswerCache, ChunkIndex, PaperStore};
use researchgraph_common::embeddings::Embedder;
use researchgraph_common::errors::{AppError, Result};
use researchgraph_common::fingerprint::Fingerprint;
use researchgraph_common::metrics;
use researchgraph_search::{RetrievedChunk, VectorRetriever};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    /// Internal UUID or arXiv id
    #[validate(length(min = 1, max = 128))]
    pub paper_id: String,

    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Cache,
    Llm,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Cache => "cache",
            AnswerSource::Llm => "llm",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub source: AnswerSource,
    /// Evidence chunk texts, most relevant first
    pub context_used: Vec<String>,
}

/// Evidence gathered for a cache miss
struct Evidence {
    chunks: Vec<RetrievedChunk>,
}

impl Evidence {
    fn none() -> Self {
        Self { chunks: Vec::new() }
    }

    fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.content.clone()).collect()
    }

    fn chunk_ids(&self) -> Vec<Uuid> {
        self.chunks.iter().map(|c| c.chunk_id).collect()
    }

    /// Keep only the chunks at `indices`, in that order
    fn select(self, indices: &[usize]) -> Self {
        let chunks = indices
            .iter()
            .filter_map(|&i| self.chunks.get(i).cloned())
            .collect();
        Self { chunks }
    }
}

pub struct ChatService {
    papers: Arc<dyn PaperStore>,
    cache: Arc<dyn AnswerCache>,
    embedder: Arc<dyn Embedder>,
    retriever: VectorRetriever,
    generator: AnswerGenerator,
    top_k: usize,
    min_similarity: f32,
}

impl ChatService {
    pub fn new(
        papers: Arc<dyn PaperStore>,
        cache: Arc<dyn AnswerCache>,
        index: Arc<dyn ChunkIndex>,
        embedder: Arc<dyn Embedder>,
        generator: AnswerGenerator,
        top_k: usize,
        min_similarity: f32,
    ) -> Self {
        Self {
            papers,
            cache,
            embedder,
            retriever: VectorRetriever::new(index),
            generator,
            top_k,
            min_similarity,
        }
    }

    /// Answer a question about one paper
    #[instrument(skip_all, fields(paper_id = %request.paper_id))]
    pub async fn ask(&self, request: &ChatRequest) -> Result<ChatReply> {
        let start = Instant::now();

        let question = request.question.trim();
        if question.is_empty() {
            return Err(AppError::validation("question", "Question must not be empty"));
        }
        let fingerprint = Fingerprint::of(question);

        let paper = self.resolve_paper(&request.paper_id).await?;

        if let Some(reply) = self.answer_from_cache(&paper, &fingerprint).await? {
            info!(
                question_hash = %fingerprint,
                source = reply.source.as_str(),
                chunks = reply.context_used.len(),
                latency_ms = start.elapsed().as_millis() as u64,
                "Chat answered"
            );
            return Ok(reply);
        }

        let evidence = self.gather_evidence(&paper, question).await?;
        let generated = self.generator.generate(question, &evidence.texts(), &paper).await?;

        // Only passages the model actually saw are reported and cached
        let evidence = evidence.select(&generated.passages_used);
        let context_used = evidence.texts();

        self.remember(NewCacheEntry {
            paper_id: paper.id,
            question: question.to_string(),
            question_hash: fingerprint.as_str().to_string(),
            answer: generated.answer.clone(),
            context_chunk_ids: evidence.chunk_ids(),
            model_used: generated.model.clone(),
            tokens_used: generated.tokens_used.and_then(|t| i32::try_from(t).ok()),
        })
        .await;

        metrics::record_chat(AnswerSource::Llm.as_str());
        info!(
            question_hash = %fingerprint,
            source = AnswerSource::Llm.as_str(),
            chunks = context_used.len(),
            tokens = ?generated.tokens_used,
            latency_ms = start.elapsed().as_millis() as u64,
            "Chat answered"
        );

        Ok(ChatReply {
            answer: generated.answer,
            source: AnswerSource::Llm,
            context_used,
        })
    }

    async fn resolve_paper(&self, reference: &str) -> Result<Paper> {
        let reference = reference.trim();
        self.papers
            .find_paper(reference)
            .await?
            .ok_or_else(|| AppError::PaperNotFound {
                id: reference.to_string(),
            })
    }

    async fn answer_from_cache(
        &self,
        paper: &Paper,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ChatReply>> {
        let Some(entry) = self.cache.lookup(paper.id, fingerprint).await? else {
            metrics::record_cache(false);
            return Ok(None);
        };
        metrics::record_cache(true);

        let entry = match self.cache.record_hit(entry.id).await? {
            Some(updated) => updated,
            None => {
                debug!(entry_id = %entry.id, "Cache entry vanished before hit was recorded");
                entry
            }
        };

        let context_used = self
            .papers
            .chunks_by_ids(paper.id, &entry.chunk_ids())
            .await?
            .into_iter()
            .map(|c| c.content)
            .collect();

        metrics::record_chat(AnswerSource::Cache.as_str());

        Ok(Some(ChatReply {
            answer: entry.answer,
            source: AnswerSource::Cache,
            context_used,
        }))
    }

    async fn gather_evidence(&self, paper: &Paper, question: &str) -> Result<Evidence> {
        if self.papers.count_chunks(paper.id).await? == 0 {
            let has_abstract = paper
                .abstract_text
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty());
            if !has_abstract {
                return Err(AppError::NoPaperContent {
                    id: paper.arxiv_id.clone(),
                });
            }
            debug!("Paper has no chunks, answering from metadata");
            return Ok(Evidence::none());
        }

        let embed_start = Instant::now();
        let embedded = self.embedder.embed(question).await;
        metrics::record_embedding(
            embed_start.elapsed().as_secs_f64(),
            self.embedder.model_name(),
            embedded.is_ok(),
        );
        let embedding = embedded?;

        let chunks = self
            .retriever
            .search(paper.id, &embedding, self.top_k, self.min_similarity)
            .await?;
        if chunks.is_empty() {
            debug!("No chunks above similarity threshold");
        }

        Ok(Evidence { chunks })
    }

    /// Persist a generated answer. Failures never fail the request.
    async fn remember(&self, entry: NewCacheEntry) {
        match self.cache.store(entry).await {
            Ok(stored) => debug!(entry_id = %stored.id, "Answer cached"),
            Err(AppError::CacheWriteConflict { question_hash, .. }) => {
                metrics::record_cache_conflict();
                info!(question_hash = %question_hash, "Answer already cached by a concurrent request");
            }
            Err(err) => warn!(error = %err, "Failed to cache answer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use researchgraph_common::config::LlmConfig;
    use researchgraph_common::db::models::{paper_uuid, CacheEntry, NewPaper};
    use researchgraph_common::db::InMemoryStore;
    use researchgraph_common::llm::{ChatModel, Completion, GenerationParams, MockChatModel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder returning a fixed query vector
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<Completion> {
            Err(AppError::GenerationFailed {
                message: "upstream unavailable".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    /// Model that keeps every prompt it receives
    #[derive(Default)]
    struct RecordingModel {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<Completion> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(Completion {
                text: "recorded".to_string(),
                model: "recording".to_string(),
                tokens_used: None,
            })
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    /// Cache whose writes always lose the race
    struct ConflictingCache(Arc<InMemoryStore>);

    #[async_trait]
    impl AnswerCache for ConflictingCache {
        async fn lookup(&self, paper_id: Uuid, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
            self.0.lookup(paper_id, fingerprint).await
        }

        async fn record_hit(&self, entry_id: Uuid) -> Result<Option<CacheEntry>> {
            self.0.record_hit(entry_id).await
        }

        async fn store(&self, entry: NewCacheEntry) -> Result<CacheEntry> {
            Err(AppError::CacheWriteConflict {
                paper_id: entry.paper_id.to_string(),
                question_hash: entry.question_hash,
            })
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        embedder: Arc<FixedEmbedder>,
        model: Arc<MockChatModel>,
        paper: Paper,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(InMemoryStore::new(3));
            let paper = store
                .upsert_paper(NewPaper {
                    arxiv_id: "1706.03762".to_string(),
                    title: "Attention Is All You Need".to_string(),
                    abstract_text: Some("We propose the Transformer.".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();

            store
                .add_chunk(paper.id, 0, "Self-attention relates positions of a sequence.", vec![1.0, 0.0, 0.0])
                .await
                .unwrap();
            store
                .add_chunk(paper.id, 1, "Multi-head attention runs attention in parallel.", vec![0.8, 0.6, 0.0])
                .await
                .unwrap();
            store
                .add_chunk(paper.id, 2, "We trained on WMT 2014.", vec![0.0, 1.0, 0.0])
                .await
                .unwrap();

            Self {
                store,
                embedder: Arc::new(FixedEmbedder::new(vec![1.0, 0.0, 0.0])),
                model: Arc::new(MockChatModel::new()),
                paper,
            }
        }

        fn service(&self) -> ChatService {
            self.service_with(self.model.clone(), self.store.clone())
        }

        fn service_with(&self, model: Arc<dyn ChatModel>, cache: Arc<dyn AnswerCache>) -> ChatService {
            let generator = AnswerGenerator::new(
                model,
                GenerationParams::from_config(&LlmConfig::default()),
                24_000,
            );
            ChatService::new(
                self.store.clone(),
                cache,
                self.store.clone(),
                self.embedder.clone(),
                generator,
                5,
                0.0,
            )
        }
    }

    fn request(paper_id: &str, question: &str) -> ChatRequest {
        ChatRequest {
            paper_id: paper_id.to_string(),
            question: question.to_string(),
        }
    }

    #[tokio::test]
    async fn test_miss_generates_with_ranked_context() {
        let fx = Fixture::new().await;
        let reply = fx
            .service()
            .ask(&request("1706.03762", "What is self-attention?"))
            .await
            .unwrap();

        assert_eq!(reply.source, AnswerSource::Llm);
        assert!(reply.context_used.len() <= 5);
        // The orthogonal chunk scores 0.0 and is not above the threshold
        assert_eq!(
            reply.context_used,
            vec![
                "Self-attention relates positions of a sequence.".to_string(),
                "Multi-head attention runs attention in parallel.".to_string(),
            ]
        );
        assert_eq!(fx.model.calls(), 1);

        let entries = fx.store.cache_entries(fx.paper.id).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hit_count, 0);
        assert_eq!(entries[0].model_used.as_deref(), Some("mock-chat"));
    }

    #[tokio::test]
    async fn test_repeat_question_is_served_from_cache() {
        let fx = Fixture::new().await;
        let service = fx.service();

        let first = service
            .ask(&request("1706.03762", "What is self-attention?"))
            .await
            .unwrap();
        let second = service
            .ask(&request(&fx.paper.id.to_string(), "  what IS   self-attention? "))
            .await
            .unwrap();

        assert_eq!(second.source, AnswerSource::Cache);
        assert_eq!(second.answer, first.answer);
        assert_eq!(second.context_used, first.context_used);
        assert_eq!(fx.model.calls(), 1);
        assert_eq!(fx.embedder.calls(), 1);

        let entries = fx.store.cache_entries(fx.paper.id).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hit_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_paper_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx
            .service()
            .ask(&request("nonexistent", "What is self-attention?"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PaperNotFound { .. }));
        assert_eq!(fx.embedder.calls(), 0);
        assert_eq!(fx.model.calls(), 0);
        assert!(fx.store.cache_entries(fx.paper.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_is_rejected() {
        let fx = Fixture::new().await;
        let err = fx
            .service()
            .ask(&request("1706.03762", "   \n\t "))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(fx.model.calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let fx = Fixture::new().await;
        let err = fx
            .service_with(Arc::new(FailingModel), fx.store.clone())
            .ask(&request("1706.03762", "What is self-attention?"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::GenerationFailed { .. }));
        assert!(fx.store.cache_entries(fx.paper.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_cache_conflict_still_answers() {
        let fx = Fixture::new().await;
        let cache = Arc::new(ConflictingCache(fx.store.clone()));
        let reply = fx
            .service_with(fx.model.clone(), cache)
            .ask(&request("1706.03762", "What is self-attention?"))
            .await
            .unwrap();

        assert_eq!(reply.source, AnswerSource::Llm);
        assert!(!reply.answer.is_empty());
        assert!(fx.store.cache_entries(fx.paper.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_paper_without_chunks_answers_from_abstract() {
        let fx = Fixture::new().await;
        fx.store
            .upsert_paper(NewPaper {
                arxiv_id: "1409.0473".to_string(),
                title: "Neural Machine Translation by Jointly Learning to Align and Translate".to_string(),
                abstract_text: Some("We conjecture that a fixed-length vector is a bottleneck.".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let reply = fx
            .service()
            .ask(&request("1409.0473", "What is the bottleneck?"))
            .await
            .unwrap();

        assert_eq!(reply.source, AnswerSource::Llm);
        assert!(reply.context_used.is_empty());
        assert_eq!(fx.embedder.calls(), 0);
        assert_eq!(fx.store.cache_entries(paper_uuid("1409.0473")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_paper_without_any_content() {
        let fx = Fixture::new().await;
        fx.store
            .upsert_paper(NewPaper {
                arxiv_id: "2005.14165".to_string(),
                title: "Language Models are Few-Shot Learners".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = fx
            .service()
            .ask(&request("2005.14165", "How many parameters?"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NoPaperContent { .. }));
        assert_eq!(fx.model.calls(), 0);
    }

    #[tokio::test]
    async fn test_context_never_crosses_papers() {
        let fx = Fixture::new().await;
        let other = fx
            .store
            .upsert_paper(NewPaper {
                arxiv_id: "1810.04805".to_string(),
                title: "BERT".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        fx.store
            .add_chunk(other.id, 0, "BERT masks tokens.", vec![1.0, 0.0, 0.0])
            .await
            .unwrap();

        let reply = fx
            .service()
            .ask(&request("1706.03762", "What is self-attention?"))
            .await
            .unwrap();
        assert!(!reply.context_used.iter().any(|c| c.contains("BERT")));

        let reply = fx
            .service()
            .ask(&request("1810.04805", "What is self-attention?"))
            .await
            .unwrap();
        assert_eq!(reply.context_used, vec!["BERT masks tokens.".to_string()]);
    }

    #[tokio::test]
    async fn test_context_lists_only_passages_sent_to_model() {
        let fx = Fixture::new().await;
        let bert = fx
            .store
            .upsert_paper(NewPaper {
                arxiv_id: "1810.04805".to_string(),
                title: "BERT".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let oversized = "X".repeat(30_000);
        fx.store
            .add_chunk(bert.id, 0, &oversized, vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        fx.store
            .add_chunk(bert.id, 1, "BERT masks tokens.", vec![0.8, 0.6, 0.0])
            .await
            .unwrap();

        let model = Arc::new(RecordingModel::default());
        let reply = fx
            .service_with(model.clone(), fx.store.clone())
            .ask(&request("1810.04805", "How is BERT trained?"))
            .await
            .unwrap();

        assert_eq!(reply.context_used, vec!["BERT masks tokens.".to_string()]);
        let prompts = model.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("BERT masks tokens."));
        assert!(!prompts[0].contains(&oversized));

        let entries = fx.store.cache_entries(bert.id).await;
        assert_eq!(entries[0].chunk_ids().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_cache_hits_are_counted() {
        let fx = Fixture::new().await;
        let service = Arc::new(fx.service());
        service
            .ask(&request("1706.03762", "What is self-attention?"))
            .await
            .unwrap();
        assert_eq!(fx.store.cache_entries(fx.paper.id).await[0].hit_count, 0);

        let asks: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .ask(&request("1706.03762", "What is self-attention?"))
                        .await
                })
            })
            .collect();
        for ask in asks {
            assert_eq!(ask.await.unwrap().unwrap().source, AnswerSource::Cache);
        }

        assert_eq!(fx.store.cache_entries(fx.paper.id).await[0].hit_count, 2);
        assert_eq!(fx.model.calls(), 1);
    }

    #[test]
    fn test_source_serializes_lowercase() {
        let reply = ChatReply {
            answer: "a".to_string(),
            source: AnswerSource::Cache,
            context_used: vec![],
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["source"], "cache");
    }
}
