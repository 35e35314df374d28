//! Topic discovery
//!
//! Finds papers on a topic through an external literature search, asks the
//! chat model to arrange them into a reading path for the student's
//! background and stores them so they can be opened in the graph and chat.

mod arxiv;
mod planner;

pub use arxiv::{strip_version, ArxivClient};
pub use planner::ReadingPathPlanner;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use researchgraph_common::errors::Result;
use researchgraph_search::Difficulty;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Papers requested when the client does not say
const DEFAULT_COUNT: u32 = 5;

/// A paper returned by the literature search
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePaper {
    /// Version-less arXiv id
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub pdf_url: Option<String>,
}

impl CandidatePaper {
    pub fn year(&self) -> Option<i32> {
        self.published.map(|p| p.year())
    }
}

/// External search over the literature
#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    /// Papers matching `topic`, most relevant first
    async fn search(&self, topic: &str, max_results: u32) -> Result<Vec<CandidatePaper>>;
}

fn default_count() -> u32 {
    DEFAULT_COUNT
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DiscoverRequest {
    #[validate(length(min = 2, max = 200))]
    pub topic: String,

    /// Student background, e.g. "freshman in college"
    #[validate(length(min = 2, max = 200))]
    pub background: String,

    #[serde(default = "default_count")]
    #[validate(range(min = 3, max = 10))]
    pub count: u32,
}

/// One stop on the reading path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSummary {
    pub id: String,
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// 1-based position on the path
    pub reading_order: u32,
    pub difficulty: Difficulty,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub topic: String,
    pub background: String,
    pub papers: Vec<PaperSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_and_bounds() {
        let request: DiscoverRequest =
            serde_json::from_str(r#"{"topic": "graph neural networks", "background": "sophomore"}"#)
                .unwrap();
        assert_eq!(request.count, 5);
        tokio_test::assert_ok!(request.validate());

        let request: DiscoverRequest =
            serde_json::from_str(r#"{"topic": "g", "background": "sophomore", "count": 11}"#).unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("topic"));
        assert!(fields.contains_key("count"));
    }

    #[test]
    fn test_summary_uses_abstract_key() {
        let summary = PaperSummary {
            id: "id".to_string(),
            arxiv_id: "1706.03762".to_string(),
            title: "Attention Is All You Need".to_string(),
            authors: vec![],
            year: Some(2017),
            abstract_text: "text".to_string(),
            reading_order: 1,
            difficulty: Difficulty::Beginner,
            reason: "Foundational".to_string(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["abstract"], "text");
        assert_eq!(json["difficulty"], "beginner");
    }
}
