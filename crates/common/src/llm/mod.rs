//! Chat model clients
//!
//! One request, one completion. No retries happen here: a failed or
//! rate-limited call surfaces to the caller as a generation failure or
//! [`AppError::QuotaExceeded`].

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sampling parameters for a single completion
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Model output with usage accounting
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    /// Prompt plus output tokens, when the endpoint reports usage
    pub tokens_used: Option<u32>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<Completion>;

    fn model_name(&self) -> &str;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::QuotaExceeded {
            message: format!("Model quota exhausted: {}", body),
        });
    }
    Err(AppError::GenerationFailed {
        message: format!("Model API error {}: {}", status, body),
    })
}

fn request_failed(err: reqwest::Error) -> AppError {
    AppError::GenerationFailed {
        message: format!("Model API request failed: {}", err),
    }
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini `generateContent` client
pub struct GeminiChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

impl GeminiChatModel {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<Completion> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(request_failed)?;

        let parsed: GeminiResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::GenerationFailed {
                message: format!("Failed to parse model response: {}", e),
            })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AppError::GenerationFailed {
                message: "Model returned no text".to_string(),
            });
        }

        Ok(Completion {
            text,
            model: self.model.clone(),
            tokens_used: parsed
                .usage_metadata
                .map(|u| u.prompt_token_count + u.candidates_token_count),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// OpenAI-compatible `/chat/completions` client
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

impl OpenAIChatModel {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a helpful research assistant.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: params.max_output_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(request_failed)?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::GenerationFailed {
                message: format!("Failed to parse model response: {}", e),
            })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::GenerationFailed {
                message: "Model returned no choices".to_string(),
            })?;

        Ok(Completion {
            text,
            model: self.model.clone(),
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Mock chat model for development and tests
///
/// Returns a fixed reply when one is set, otherwise echoes the final prompt
/// line. Counts how often it was called.
#[derive(Default)]
pub struct MockChatModel {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let text = match &self.reply {
            Some(reply) => reply.clone(),
            None => {
                let last = prompt.lines().last().unwrap_or_default();
                format!("Mock answer to: {}", last.trim())
            }
        };

        Ok(Completion {
            tokens_used: Some((prompt.len() / 4 + text.len() / 4) as u32),
            text,
            model: "mock-chat".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create a chat model based on configuration
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    let key = || {
        config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: format!("{} chat provider requires llm.api_key", config.provider),
            })
    };

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiChatModel::new(key()?, config)?)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(key()?, config)?)),
        "mock" => Ok(Arc::new(MockChatModel::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown chat provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams::from_config(&LlmConfig::default())
    }

    #[tokio::test]
    async fn test_mock_echoes_last_line() {
        let model = MockChatModel::new();
        let completion = model
            .complete("Context:\nabc\n\nQuestion: What is attention?", &params())
            .await
            .unwrap();
        assert_eq!(completion.text, "Mock answer to: Question: What is attention?");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_fixed_reply() {
        let model = MockChatModel::with_reply("42");
        let completion = model.complete("anything", &params()).await.unwrap();
        assert_eq!(completion.text, "42");
        assert_eq!(completion.model, "mock-chat");
    }

    #[test]
    fn test_params_from_config() {
        let p = params();
        assert!((p.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(p.max_output_tokens, 1024);
    }

    #[test]
    fn test_factory_requires_key() {
        let err = create_chat_model(&LlmConfig::default()).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));

        let mock = LlmConfig {
            provider: "mock".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(create_chat_model(&mock).unwrap().model_name(), "mock-chat");
    }

    #[test]
    fn test_gemini_usage_sums_tokens() {
        let body = r#"{
            "candidates": [{"content": {"parts": [{"text": "Hello"}, {"text": " world"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let usage = parsed.usage_metadata.unwrap();
        assert_eq!(usage.prompt_token_count + usage.candidates_token_count, 15);
    }
}
