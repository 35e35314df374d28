//! Embedding service abstraction
//!
//! Provides a unified interface for multiple embedding providers:
//! - Gemini (text-embedding-004)
//! - OpenAI (text-embedding-3-small and friends)
//! - Deterministic mock for tests and offline runs
//!
//! Question embeddings must share a dimension with the stored chunk
//! embeddings; the retriever rejects mismatches.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Cosine similarity of two vectors; 0.0 when either is all zeros or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Classify a transport failure for the retry loop
fn transport_error(err: reqwest::Error, timeout_secs: u64) -> backoff::Error<AppError> {
    if err.is_timeout() {
        backoff::Error::transient(AppError::EmbeddingTimeout {
            timeout_ms: timeout_secs * 1000,
        })
    } else {
        backoff::Error::transient(AppError::EmbeddingError {
            message: format!("Request failed: {}", err),
        })
    }
}

/// Classify a non-success HTTP status for the retry loop
fn status_error(status: reqwest::StatusCode, body: String) -> backoff::Error<AppError> {
    let err = AppError::EmbeddingError {
        message: format!("API error {}: {}", status, body),
    };
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

/// Run `op` with exponential backoff, giving up after `max_retries` retries
async fn with_retry<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, backoff::Error<AppError>>>,
{
    let attempts = &AtomicU32::new(0);
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_elapsed_time(Some(Duration::from_secs(30)))
        .build();

    backoff::future::retry_notify(
        policy,
        move || {
            let fut = op();
            async move {
                match fut.await {
                    Err(backoff::Error::Transient { err, .. })
                        if attempts.fetch_add(1, Ordering::Relaxed) >= max_retries =>
                    {
                        Err(backoff::Error::permanent(err))
                    }
                    other => other,
                }
            }
        },
        |err: AppError, delay: Duration| {
            warn!(error = %err, retry_in_ms = delay.as_millis() as u64, "Embedding request failed, retrying");
        },
    )
    .await
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini embedding client (`embedContent`, task type `RETRIEVAL_QUERY`)
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiEmbedRequest<'a> {
    model: String,
    content: GeminiContent<'a>,
    task_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GeminiEmbedResponse {
    embedding: Option<GeminiValues>,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    fn request<'a>(&self, text: &'a str) -> GeminiEmbedRequest<'a> {
        GeminiEmbedRequest {
            model: format!("models/{}", self.model),
            content: GeminiContent {
                parts: vec![GeminiPart { text }],
            },
            task_type: "RETRIEVAL_QUERY",
        }
    }

    async fn make_request(&self, text: &str) -> std::result::Result<Vec<f32>, backoff::Error<AppError>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let body = self.request(text);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let result: GeminiEmbedResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })
        })?;

        result.embedding.map(|e| e.values).ok_or_else(|| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_retry(self.max_retries, move || self.make_request(text)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a str,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    async fn make_request(&self, text: &str) -> std::result::Result<Vec<f32>, backoff::Error<AppError>> {
        let url = format!("{}/embeddings", self.base_url);

        // Only the text-embedding-3 family can shorten its output
        let dimensions = self
            .model
            .starts_with("text-embedding-3")
            .then_some(self.dimension);

        let request = OpenAIRequest {
            input: text,
            model: &self.model,
            dimensions,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            })
        })?;

        result.data.into_iter().next().map(|e| e.embedding).ok_or_else(|| {
            backoff::Error::permanent(AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_retry(self.max_retries, move || self.make_request(text)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Mock embedder for testing
///
/// Vectors are unit length and seeded from the text, so equal texts embed
/// identically across runs.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        let mut rng = StdRng::from_seed(seed);

        let raw: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
        Ok(raw.into_iter().map(|x| x / norm).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn require_key(provider: &str, key: Option<&String>) -> Result<String> {
    key.filter(|k| !k.is_empty())
        .cloned()
        .ok_or_else(|| AppError::Configuration {
            message: format!("{} embedding provider requires embedding.api_key", provider),
        })
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "gemini" => {
            let key = require_key("gemini", config.api_key.as_ref())?;
            Ok(Arc::new(GeminiEmbedder::new(key, config)?))
        }
        "openai" => {
            let key = require_key("openai", config.api_key.as_ref())?;
            Ok(Arc::new(OpenAIEmbedder::new(key, config)?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}
