//! Node/edge views of citation neighbourhoods
//!
//! The shapes follow what React Flow consumes: nodes of type `paperNode`
//! with a position and display data, edges keyed `e-{source}-{target}`.

use super::graph::{LinkKind, Neighborhood};
use researchgraph_common::db::models::Paper;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Distance between the center node and its neighbours
pub const SATELLITE_RADIUS: f64 = 300.0;

/// Number of authors shown on a node
const NODE_AUTHORS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Reading difficulty tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    /// Lenient parse of model output; unknown labels give `None`
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub title: String,
    pub arxiv_id: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "isCenter", default)]
    pub is_center: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub kind: String,
    pub position: Position,
    pub data: NodeData,
}

fn default_node_type() -> String {
    "paperNode".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub animated: bool,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, animated: bool) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e-{}-{}", source, target),
            source,
            target,
            animated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// `count` positions spaced evenly on a circle around `center`
pub fn arrange_satellites(center: Position, count: usize, radius: f64) -> Vec<Position> {
    (0..count)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / count.max(1) as f64;
            Position {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect()
}

impl GraphNode {
    pub fn for_paper(paper: &Paper, position: Position, is_center: bool) -> Self {
        Self {
            id: paper.id.to_string(),
            kind: default_node_type(),
            position,
            data: NodeData {
                title: paper.title.clone(),
                arxiv_id: paper.arxiv_id.clone(),
                year: paper.year(),
                authors: paper.authors().into_iter().take(NODE_AUTHORS).collect(),
                is_center,
                reading_order: None,
                difficulty: None,
            },
        }
    }
}

impl GraphView {
    /// Lay out a neighbourhood with the center paper at `center`
    pub fn from_neighborhood(hood: &Neighborhood, center: Position) -> Self {
        let positions = arrange_satellites(center, hood.adjacent.len(), SATELLITE_RADIUS);

        let mut nodes = Vec::with_capacity(hood.adjacent.len() + 1);
        nodes.push(GraphNode::for_paper(&hood.center, center, true));
        nodes.extend(
            hood.adjacent
                .iter()
                .zip(positions)
                .map(|(paper, position)| GraphNode::for_paper(paper, position, false)),
        );

        let edges = hood
            .links
            .iter()
            .map(|link| {
                GraphEdge::new(
                    link.source.to_string(),
                    link.target.to_string(),
                    link.kind == LinkKind::CitedBy,
                )
            })
            .collect();

        Self { nodes, edges }
    }

    pub fn position_of(&self, node_id: &str) -> Option<Position> {
        self.nodes.iter().find(|n| n.id == node_id).map(|n| n.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::graph::CitationLink;
    use researchgraph_common::db::models::paper_uuid;
    use uuid::Uuid;

    fn paper(arxiv_id: &str, authors: &[&str]) -> Paper {
        let now = chrono::Utc::now();
        Paper {
            id: paper_uuid(arxiv_id),
            arxiv_id: arxiv_id.to_string(),
            title: format!("Paper {}", arxiv_id),
            abstract_text: None,
            authors: serde_json::json!(authors),
            categories: serde_json::json!([]),
            references: serde_json::json!([]),
            cited_by: serde_json::json!([]),
            published_date: Some(
                chrono::DateTime::parse_from_rfc3339("2017-06-12T00:00:00Z").unwrap(),
            ),
            pdf_url: None,
            is_processed: false,
            chunk_count: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_satellites_on_circle() {
        let center = Position { x: 10.0, y: -5.0 };
        let positions = arrange_satellites(center, 4, SATELLITE_RADIUS);
        assert_eq!(positions.len(), 4);
        for p in &positions {
            let distance = ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt();
            assert!((distance - SATELLITE_RADIUS).abs() < 1e-9);
        }
        assert!((positions[0].x - 310.0).abs() < 1e-9);
        assert!(arrange_satellites(center, 0, SATELLITE_RADIUS).is_empty());
    }

    #[test]
    fn test_view_shape() {
        let center = paper("1706.03762", &["Vaswani", "Shazeer", "Parmar", "Uszkoreit"]);
        let cited = paper("1409.0473", &["Bahdanau"]);
        let citer = paper("1810.04805", &["Devlin"]);
        let hood = Neighborhood {
            links: vec![
                CitationLink { source: center.id, target: cited.id, kind: LinkKind::References },
                CitationLink { source: citer.id, target: center.id, kind: LinkKind::CitedBy },
            ],
            adjacent: vec![cited.clone(), citer.clone()],
            center: center.clone(),
        };

        let view = GraphView::from_neighborhood(&hood, Position::default());
        assert_eq!(view.nodes.len(), 3);
        assert!(view.nodes[0].data.is_center);
        assert_eq!(view.nodes[0].data.authors.len(), 3);
        assert_eq!(view.nodes[0].data.year, Some(2017));
        assert_eq!(view.edges[0].id, format!("e-{}-{}", center.id, cited.id));
        assert!(!view.edges[0].animated);
        assert!(view.edges[1].animated);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["nodes"][0]["type"], "paperNode");
        assert_eq!(json["nodes"][0]["data"]["isCenter"], true);
        assert!(json["nodes"][0]["data"].get("difficulty").is_none());
    }

    #[test]
    fn test_client_payload_deserializes() {
        let id = Uuid::new_v4();
        let raw = serde_json::json!({
            "nodes": [{
                "id": id.to_string(),
                "position": {"x": 1.5, "y": 2.0},
                "data": {"title": "T", "arxiv_id": "1", "year": null}
            }],
            "edges": [{"id": "e-a-b", "source": "a", "target": "b"}]
        });
        let view: GraphView = serde_json::from_value(raw).unwrap();
        assert_eq!(view.nodes[0].kind, "paperNode");
        assert_eq!(view.position_of(&id.to_string()), Some(Position { x: 1.5, y: 2.0 }));
        assert!(!view.edges[0].animated);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!(Difficulty::parse(" Advanced "), Some(Difficulty::Advanced));
        assert_eq!(Difficulty::parse("expert"), None);
    }
}
