//! Citation neighbourhood lookups

use researchgraph_common::db::models::Paper;
use researchgraph_common::db::PaperStore;
use researchgraph_common::errors::{AppError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Direction of a citation relative to the center paper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// The center paper references the neighbour
    References,
    /// The neighbour cites the center paper
    CitedBy,
}

/// Directed citation between two known papers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationLink {
    /// Citing paper
    pub source: Uuid,
    /// Cited paper
    pub target: Uuid,
    pub kind: LinkKind,
}

/// A paper together with the known papers it cites or is cited by
#[derive(Debug, Clone)]
pub struct Neighborhood {
    pub center: Paper,

    /// Known neighbours in stored order: references first, then citers
    pub adjacent: Vec<Paper>,

    pub links: Vec<CitationLink>,
}

/// Reads neighbourhoods from the paper store
pub struct CitationGraphRepository {
    papers: Arc<dyn PaperStore>,
}

impl CitationGraphRepository {
    pub fn new(papers: Arc<dyn PaperStore>) -> Self {
        Self { papers }
    }

    /// Neighbourhood of the paper identified by UUID or arXiv id
    #[instrument(skip(self))]
    pub async fn neighbors(&self, reference: &str) -> Result<Neighborhood> {
        let center = self
            .papers
            .find_paper(reference)
            .await?
            .ok_or_else(|| AppError::PaperNotFound {
                id: reference.to_string(),
            })?;

        let references = center.references();
        let cited_by = center.cited_by();

        // Ordered, de-duplicated, without self-references
        let mut seen = HashSet::new();
        let related: Vec<String> = references
            .iter()
            .chain(cited_by.iter())
            .filter(|id| **id != center.arxiv_id)
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        if related.is_empty() {
            return Ok(Neighborhood {
                center,
                adjacent: Vec::new(),
                links: Vec::new(),
            });
        }

        let mut known: HashMap<String, Paper> = self
            .papers
            .find_papers_by_arxiv_ids(&related)
            .await?
            .into_iter()
            .map(|p| (p.arxiv_id.clone(), p))
            .collect();

        let adjacent: Vec<Paper> = related
            .iter()
            .filter_map(|arxiv_id| known.remove(arxiv_id))
            .filter(|p| p.id != center.id)
            .collect();

        let mut links = Vec::new();
        for paper in &adjacent {
            if references.contains(&paper.arxiv_id) {
                links.push(CitationLink {
                    source: center.id,
                    target: paper.id,
                    kind: LinkKind::References,
                });
            }
            if cited_by.contains(&paper.arxiv_id) {
                links.push(CitationLink {
                    source: paper.id,
                    target: center.id,
                    kind: LinkKind::CitedBy,
                });
            }
        }

        debug!(
            related = related.len(),
            known = adjacent.len(),
            "Resolved citation neighbourhood"
        );

        Ok(Neighborhood {
            center,
            adjacent,
            links,
        })
    }
}
