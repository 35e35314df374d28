//! Reading path planning

use super::{CandidatePaper, DiscoverRequest, DiscoverResponse, LiteratureSearch, PaperSummary};
use regex_lite::Regex;
use researchgraph_common::config::DiscoveryConfig;
use researchgraph_common::db::models::NewPaper;
use researchgraph_common::db::PaperStore;
use researchgraph_common::errors::{AppError, Result};
use researchgraph_common::llm::{ChatModel, GenerationParams};
use researchgraph_common::metrics;
use researchgraph_search::Difficulty;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Abstract characters shown to the model per paper
const PROMPT_ABSTRACT_CHARS: usize = 400;

/// Abstract characters returned to the client
const SUMMARY_ABSTRACT_CHARS: usize = 500;

const SUMMARY_AUTHORS: usize = 3;

const UNRANKED_REASON: &str = "Not ranked by advisor";
const CHRONOLOGICAL_REASON: &str = "Ordered by publication year";

/// Year used to sort papers with no publication date
const UNKNOWN_YEAR: i32 = 9999;

#[derive(Debug, Deserialize)]
struct RankedItem {
    #[serde(default)]
    arxiv_id: String,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// A candidate with its place on the path
#[derive(Debug, Clone)]
struct PlacedPaper {
    paper: CandidatePaper,
    reading_order: u32,
    difficulty: Difficulty,
    reason: String,
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn ranking_prompt(topic: &str, background: &str, papers: &[CandidatePaper]) -> String {
    let descriptions: Vec<String> = papers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let year = p
                .year()
                .map(|y| y.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "{}. [arXiv:{}] \"{}\" ({})\n   Abstract: {}...",
                i + 1,
                p.arxiv_id,
                p.title,
                year,
                truncate_chars(&p.abstract_text, PROMPT_ABSTRACT_CHARS)
            )
        })
        .collect();

    format!(
        "You are an academic advisor. A student with the background \"{background}\" \
wants to learn about \"{topic}\".\n\n\
Here are {count} research papers found on this topic:\n\n\
{papers}\n\n\
Create an optimal reading path from most foundational/accessible to most \
advanced/specialized, considering the student's background level.\n\n\
Return ONLY a JSON array (no markdown, no commentary). Each element must have:\n\
- \"arxiv_id\": the paper's arXiv ID exactly as shown above\n\
- \"difficulty\": one of \"beginner\", \"intermediate\", \"advanced\"\n\
- \"reason\": one sentence explaining why this paper is at this position\n\n\
Order the array from first-to-read to last-to-read.\n\n\
Consider:\n\
- Foundational/survey papers should come before papers that build on them\n\
- The student's background determines what counts as beginner\n\
- Newer papers that depend on older results should come later\n\
- Papers introducing basic concepts before papers using advanced techniques\n",
        background = background,
        topic = topic,
        count = papers.len(),
        papers = descriptions.join("\n\n"),
    )
}

/// Apply the model's ordering to `papers`.
///
/// Unknown and repeated ids are ignored; papers the model left out are
/// appended as intermediate.
fn apply_ranking(reply: &str, papers: &[CandidatePaper]) -> Result<Vec<PlacedPaper>> {
    let pattern = Regex::new(r"(?s)\[.*\]").map_err(|e| AppError::Internal {
        message: format!("Invalid ranking pattern: {}", e),
    })?;
    let reply = reply.trim();
    let json = pattern.find(reply).map(|m| m.as_str()).unwrap_or(reply);

    let ranking: Vec<RankedItem> = serde_json::from_str(json).map_err(|e| AppError::GenerationFailed {
        message: format!("Unreadable reading order: {}", e),
    })?;

    let mut placed: Vec<PlacedPaper> = Vec::with_capacity(papers.len());
    let mut seen: HashSet<&str> = HashSet::new();

    for item in &ranking {
        let Some(paper) = papers.iter().find(|p| p.arxiv_id == item.arxiv_id) else {
            continue;
        };
        if !seen.insert(paper.arxiv_id.as_str()) {
            continue;
        }
        placed.push(PlacedPaper {
            paper: paper.clone(),
            reading_order: placed.len() as u32 + 1,
            difficulty: item
                .difficulty
                .as_deref()
                .and_then(Difficulty::parse)
                .unwrap_or(Difficulty::Intermediate),
            reason: item.reason.clone().unwrap_or_default(),
        });
    }

    for paper in papers {
        if seen.contains(paper.arxiv_id.as_str()) {
            continue;
        }
        placed.push(PlacedPaper {
            paper: paper.clone(),
            reading_order: placed.len() as u32 + 1,
            difficulty: Difficulty::Intermediate,
            reason: UNRANKED_REASON.to_string(),
        });
    }

    Ok(placed)
}

/// Oldest first, difficulty by tertile
fn chronological(papers: &[CandidatePaper]) -> Vec<PlacedPaper> {
    let mut sorted = papers.to_vec();
    sorted.sort_by_key(|p| p.year().unwrap_or(UNKNOWN_YEAR));

    let n = sorted.len();
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, paper)| {
            let difficulty = if i < n / 3 {
                Difficulty::Beginner
            } else if i >= 2 * n / 3 {
                Difficulty::Advanced
            } else {
                Difficulty::Intermediate
            };
            PlacedPaper {
                paper,
                reading_order: i as u32 + 1,
                difficulty,
                reason: CHRONOLOGICAL_REASON.to_string(),
            }
        })
        .collect()
}

pub struct ReadingPathPlanner {
    search: Arc<dyn LiteratureSearch>,
    model: Arc<dyn ChatModel>,
    papers: Arc<dyn PaperStore>,
    params: GenerationParams,
}

impl ReadingPathPlanner {
    pub fn new(
        search: Arc<dyn LiteratureSearch>,
        model: Arc<dyn ChatModel>,
        papers: Arc<dyn PaperStore>,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            search,
            model,
            papers,
            params: GenerationParams {
                temperature: config.ranking_temperature,
                max_output_tokens: config.ranking_max_tokens,
            },
        }
    }

    /// Find papers on a topic and order them into a reading path
    #[instrument(skip_all, fields(topic = %request.topic, count = request.count))]
    pub async fn discover(&self, request: &DiscoverRequest) -> Result<DiscoverResponse> {
        let candidates = self.search.search(&request.topic, request.count).await?;
        if candidates.is_empty() {
            return Err(AppError::NoDiscoveryResults {
                topic: request.topic.clone(),
            });
        }

        let (path, ordering) = match self.rank(request, &candidates).await {
            Ok(path) => (path, "ranked"),
            Err(err) => {
                warn!(error = %err, "Model ranking failed, using publication order");
                (chronological(&candidates), "fallback")
            }
        };
        metrics::record_discovery(ordering);

        let all_ids: Vec<String> = path.iter().map(|p| p.paper.arxiv_id.clone()).collect();
        let mut summaries = Vec::with_capacity(path.len());

        for placed in path {
            let candidate = placed.paper;
            let references: Vec<String> = all_ids
                .iter()
                .filter(|id| **id != candidate.arxiv_id)
                .cloned()
                .collect();

            let stored = self
                .papers
                .upsert_paper(NewPaper {
                    arxiv_id: candidate.arxiv_id.clone(),
                    title: candidate.title.clone(),
                    abstract_text: Some(candidate.abstract_text.clone()),
                    authors: candidate.authors.clone(),
                    categories: candidate.categories.clone(),
                    references,
                    cited_by: Vec::new(),
                    published_date: candidate.published,
                    pdf_url: candidate.pdf_url.clone(),
                })
                .await?;

            let abstract_text = if candidate.abstract_text.chars().count() > SUMMARY_ABSTRACT_CHARS {
                format!("{}...", truncate_chars(&candidate.abstract_text, SUMMARY_ABSTRACT_CHARS))
            } else {
                candidate.abstract_text.clone()
            };

            summaries.push(PaperSummary {
                id: stored.id.to_string(),
                year: candidate.year(),
                arxiv_id: candidate.arxiv_id,
                title: candidate.title,
                authors: candidate.authors.into_iter().take(SUMMARY_AUTHORS).collect(),
                abstract_text,
                reading_order: placed.reading_order,
                difficulty: placed.difficulty,
                reason: placed.reason,
            });
        }

        info!(papers = summaries.len(), ordering, "Reading path built");

        Ok(DiscoverResponse {
            topic: request.topic.clone(),
            background: request.background.clone(),
            papers: summaries,
        })
    }

    async fn rank(&self, request: &DiscoverRequest, papers: &[CandidatePaper]) -> Result<Vec<PlacedPaper>> {
        let prompt = ranking_prompt(&request.topic, &request.background, papers);
        let completion = self.model.complete(&prompt, &self.params).await?;
        apply_ranking(&completion.text, papers)
    }
}
