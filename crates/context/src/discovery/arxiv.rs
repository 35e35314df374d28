//! arXiv export API client
//!
//! The API returns an Atom feed. Only the fields used by discovery are
//! deserialized.

use super::{CandidatePaper, LiteratureSearch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use researchgraph_common::config::DiscoveryConfig;
use researchgraph_common::errors::{AppError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

/// Bare arXiv id from an entry id URL, without the version suffix
///
/// `http://arxiv.org/abs/1706.03762v7` becomes `1706.03762`.
pub fn strip_version(entry_id: &str) -> String {
    let id = entry_id.rsplit('/').next().unwrap_or(entry_id);
    match id.rsplit_once('v') {
        Some((base, _)) => base.to_string(),
        None => id.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl AtomEntry {
    fn into_candidate(self) -> CandidatePaper {
        let published = self
            .published
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p.trim()).ok())
            .map(|p| p.with_timezone(&Utc));

        let pdf_url = self
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .map(|l| l.href.clone());

        CandidatePaper {
            arxiv_id: strip_version(self.id.trim()),
            title: collapse_whitespace(&self.title),
            authors: self.authors.into_iter().map(|a| a.name.trim().to_string()).collect(),
            abstract_text: collapse_whitespace(&self.summary),
            categories: self.categories.into_iter().map(|c| c.term).collect(),
            published,
            pdf_url,
        }
    }
}

/// Parse an Atom response body into candidates, in feed order
pub(crate) fn parse_feed(xml: &str) -> Result<Vec<CandidatePaper>> {
    let feed: AtomFeed = quick_xml::de::from_str(xml).map_err(|e| AppError::LiteratureSearch {
        message: format!("Failed to parse arXiv feed: {}", e),
    })?;
    Ok(feed.entries.into_iter().map(AtomEntry::into_candidate).collect())
}

pub struct ArxivClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ResearchGraph/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.arxiv_base_url.clone(),
        })
    }
}

#[async_trait]
impl LiteratureSearch for ArxivClient {
    #[instrument(skip(self))]
    async fn search(&self, topic: &str, max_results: u32) -> Result<Vec<CandidatePaper>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", format!("all:{}", topic)),
                ("start", "0".to_string()),
                ("max_results", max_results.to_string()),
                ("sortBy", "relevance".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::LiteratureSearch {
                message: format!("arXiv request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::LiteratureSearch {
                message: format!("arXiv returned {}", status),
            });
        }

        let body = response.text().await.map_err(|e| AppError::LiteratureSearch {
            message: format!("Failed to read arXiv response: {}", e),
        })?;

        let papers = parse_feed(&body)?;
        debug!(results = papers.len(), "arXiv search complete");
        Ok(papers)
    }
}
