//! Repository pattern for database operations
//!
//! Postgres implementation of the store traits. Entity CRUD goes through
//! SeaORM; the vector similarity query goes through sqlx with `pgvector`.

use crate::db::models::*;
use crate::db::store::{AnswerCache, ChunkIndex, PaperStore};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use pgvector::Vector;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, Set, SqlErr, Statement,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ScoredChunkRow {
    id: Uuid,
    paper_id: Uuid,
    content: String,
    chunk_index: i32,
    similarity: f64,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    dimension: usize,
}

impl Repository {
    /// Create a new repository; `dimension` must match `paper_chunks.embedding`
    pub fn new(pool: DbPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

// ============================================================================
// Papers
// ============================================================================

#[async_trait]
impl PaperStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn find_paper(&self, reference: &str) -> Result<Option<Paper>> {
        let mut condition = Condition::any().add(PaperColumn::ArxivId.eq(reference));
        if let Ok(id) = Uuid::parse_str(reference) {
            condition = condition.add(PaperColumn::Id.eq(id));
        }

        PaperEntity::find()
            .filter(condition)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_papers_by_arxiv_ids(&self, arxiv_ids: &[String]) -> Result<Vec<Paper>> {
        if arxiv_ids.is_empty() {
            return Ok(Vec::new());
        }

        PaperEntity::find()
            .filter(PaperColumn::ArxivId.is_in(arxiv_ids.iter().cloned()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn upsert_paper(&self, paper: NewPaper) -> Result<Paper> {
        let now = chrono::Utc::now();

        let model = PaperActiveModel {
            id: Set(paper_uuid(&paper.arxiv_id)),
            arxiv_id: Set(paper.arxiv_id),
            title: Set(paper.title),
            abstract_text: Set(paper.abstract_text),
            authors: Set(serde_json::json!(paper.authors)),
            categories: Set(serde_json::json!(paper.categories)),
            references: Set(serde_json::json!(paper.references)),
            cited_by: Set(serde_json::json!(paper.cited_by)),
            published_date: Set(paper.published_date.map(Into::into)),
            pdf_url: Set(paper.pdf_url),
            is_processed: Set(false),
            chunk_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        // Existing rows keep their id, cited-by list and processing state
        let on_conflict = OnConflict::column(PaperColumn::ArxivId)
            .update_columns([
                PaperColumn::Title,
                PaperColumn::AbstractText,
                PaperColumn::Authors,
                PaperColumn::References,
                PaperColumn::UpdatedAt,
            ])
            .to_owned();

        PaperEntity::insert(model)
            .on_conflict(on_conflict)
            .exec_with_returning(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn count_chunks(&self, paper_id: Uuid) -> Result<u64> {
        ChunkEntity::find()
            .filter(ChunkColumn::PaperId.eq(paper_id))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn chunks_by_ids(&self, paper_id: Uuid, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<Uuid, Chunk> = ChunkEntity::find()
            .filter(ChunkColumn::PaperId.eq(paper_id))
            .filter(ChunkColumn::Id.is_in(ids.iter().copied()))
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(|chunk| (chunk.id, chunk))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

// ============================================================================
// Answer cache
// ============================================================================

#[async_trait]
impl AnswerCache for Repository {
    async fn lookup(&self, paper_id: Uuid, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        // Primary, so an entry written a moment ago is visible
        CacheEntryEntity::find()
            .filter(CacheEntryColumn::PaperId.eq(paper_id))
            .filter(CacheEntryColumn::QuestionHash.eq(fingerprint.as_str()))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn record_hit(&self, entry_id: Uuid) -> Result<Option<CacheEntry>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE chat_cache
            SET hit_count = hit_count + 1, last_accessed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
            vec![entry_id.into()],
        );

        CacheEntryEntity::find()
            .from_raw_sql(stmt)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn store(&self, entry: NewCacheEntry) -> Result<CacheEntry> {
        let now = chrono::Utc::now();
        let chunk_ids: Vec<String> = entry
            .context_chunk_ids
            .iter()
            .map(Uuid::to_string)
            .collect();

        let model = CacheEntryActiveModel {
            id: Set(Uuid::new_v4()),
            paper_id: Set(entry.paper_id),
            question: Set(entry.question),
            question_hash: Set(entry.question_hash.clone()),
            answer: Set(entry.answer),
            context_chunk_ids: Set(serde_json::json!(chunk_ids)),
            model_used: Set(Some(entry.model_used)),
            tokens_used: Set(entry.tokens_used),
            hit_count: Set(0),
            created_at: Set(now.into()),
            last_accessed_at: Set(now.into()),
        };

        match model.insert(self.write_conn()).await {
            Ok(stored) => Ok(stored),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                debug!(paper_id = %entry.paper_id, "Cache entry already present");
                Err(AppError::CacheWriteConflict {
                    paper_id: entry.paper_id.to_string(),
                    question_hash: entry.question_hash,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

// ============================================================================
// Vector search
// ============================================================================

#[async_trait]
impl ChunkIndex for Repository {
    async fn nearest_chunks(
        &self,
        paper_id: Uuid,
        embedding: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let rows: Vec<ScoredChunkRow> = sqlx::query_as(
            r#"
            SELECT
                id,
                paper_id,
                content,
                chunk_index,
                (1 - (embedding <=> $2))::float8 AS similarity
            FROM paper_chunks
            WHERE paper_id = $1
              AND embedding IS NOT NULL
              AND 1 - (embedding <=> $2) > $3
            ORDER BY embedding <=> $2
            LIMIT $4
            "#,
        )
        .bind(paper_id)
        .bind(Vector::from(embedding.to_vec()))
        .bind(f64::from(min_similarity))
        .bind(limit as i64)
        .fetch_all(self.read_conn().get_postgres_connection_pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredChunk {
                chunk_id: row.id,
                paper_id: row.paper_id,
                content: row.content,
                chunk_index: row.chunk_index,
                similarity: row.similarity as f32,
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
