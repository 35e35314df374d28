//! Answer generation
//!
//! Builds the prompt from paper metadata and retrieved passages and makes a
//! single chat-model call. Nothing is cached or retried at this level.

use researchgraph_common::db::models::Paper;
use researchgraph_common::errors::Result;
use researchgraph_common::llm::{ChatModel, GenerationParams};
use researchgraph_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Reference ids listed in the metadata block
const MAX_LISTED_REFERENCES: usize = 20;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const INSTRUCTIONS: &str = "You are a helpful research assistant that answers questions about academic papers. \
You have access to the paper's full metadata including title, authors, publication date, \
abstract, categories, references, and more. \
Answer the question accurately based on the provided context. \
For factual questions (who wrote it, when was it published, how many references, etc.), \
answer directly from the metadata. \
For conceptual questions, provide helpful background knowledge to help the student understand. \
If the context doesn't fully answer the question, use your general knowledge to supplement, \
but clearly indicate when you're doing so.";

/// Generated answer with usage accounting
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    /// Indices into the given passages that were placed in the prompt
    pub passages_used: Vec<usize>,
}

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    params: GenerationParams,
    max_context_chars: usize,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>, params: GenerationParams, max_context_chars: usize) -> Self {
        Self {
            model,
            params,
            max_context_chars,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Answer `question` from the paper's metadata and `passages`, most relevant first
    #[instrument(skip_all, fields(paper = %paper.arxiv_id, passages = passages.len()))]
    pub async fn generate(
        &self,
        question: &str,
        passages: &[String],
        paper: &Paper,
    ) -> Result<GeneratedAnswer> {
        let passages_used = self.fit_passages(passages);
        let prompt = self.build_prompt(question, passages, &passages_used, paper);

        let start = Instant::now();
        let result = self.model.complete(&prompt, &self.params).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(completion) => {
                metrics::record_generation(elapsed, &completion.model, completion.tokens_used, true);
                debug!(tokens = ?completion.tokens_used, elapsed_ms = (elapsed * 1000.0) as u64, "Answer generated");
                Ok(GeneratedAnswer {
                    answer: completion.text,
                    model: completion.model,
                    tokens_used: completion.tokens_used,
                    passages_used,
                })
            }
            Err(err) => {
                metrics::record_generation(elapsed, self.model.model_name(), None, false);
                Err(err)
            }
        }
    }

    /// Indices of the passages that fit the character budget, in rank order.
    ///
    /// A passage longer than the remaining budget is skipped; later, shorter
    /// passages may still fit.
    pub fn fit_passages(&self, passages: &[String]) -> Vec<usize> {
        let mut budget = self.max_context_chars;
        let mut fitted = Vec::with_capacity(passages.len());
        for (i, passage) in passages.iter().enumerate() {
            let chars = passage.chars().count();
            if chars > budget {
                debug!(passage = i, chars, budget, "Passage exceeds context budget, skipped");
                continue;
            }
            budget -= chars;
            fitted.push(i);
        }
        fitted
    }

    /// Full prompt: instructions, metadata block, then the selected passages
    pub fn build_prompt(
        &self,
        question: &str,
        passages: &[String],
        selected: &[usize],
        paper: &Paper,
    ) -> String {
        let mut context = vec![paper_context(paper)];
        context.extend(selected.iter().filter_map(|&i| passages.get(i)).cloned());

        format!(
            "{}\n\nContext:\n{}\n\nQuestion: {}",
            INSTRUCTIONS,
            context.join(CONTEXT_SEPARATOR),
            question
        )
    }
}

/// Text block describing a paper's metadata and abstract
pub fn paper_context(paper: &Paper) -> String {
    let mut parts = vec![format!("Title: {}", paper.title)];

    if !paper.arxiv_id.is_empty() {
        parts.push(format!("arXiv ID: {}", paper.arxiv_id));
    }

    let authors = paper.authors();
    if !authors.is_empty() {
        parts.push(format!("Authors: {}", authors.join(", ")));
        parts.push(format!("Number of authors: {}", authors.len()));
    }

    if let Some(published) = paper.published_date {
        parts.push(format!("Published: {}", published.format("%Y-%m-%d")));
    }

    let categories = paper.categories();
    if !categories.is_empty() {
        parts.push(format!("Categories: {}", categories.join(", ")));
    }

    if let Some(pdf_url) = paper.pdf_url.as_deref().filter(|u| !u.is_empty()) {
        parts.push(format!("PDF URL: {}", pdf_url));
    }

    let references = paper.references();
    if !references.is_empty() {
        parts.push(format!("Number of references: {}", references.len()));
        let listed: Vec<&str> = references
            .iter()
            .take(MAX_LISTED_REFERENCES)
            .map(String::as_str)
            .collect();
        parts.push(format!("References (arXiv IDs): {}", listed.join(", ")));
    }

    let cited_by = paper.cited_by();
    if !cited_by.is_empty() {
        parts.push(format!("Cited by: {} papers", cited_by.len()));
    }

    if let Some(abstract_text) = paper.abstract_text.as_deref().filter(|a| !a.is_empty()) {
        parts.push(format!("\nAbstract:\n{}", abstract_text));
    }

    parts.join("\n")
}
