//! Citation graph handlers

use axum::{
    extract::{Path, State},
    Json,
};
use researchgraph_common::errors::Result;
use researchgraph_common::metrics;
use researchgraph_search::{GraphEdge, GraphNode, GraphView, Position};
use serde::Deserialize;
use validator::Validate;

use super::invalid_request;
use crate::AppState;

/// Click-to-expand request carrying the graph the client already shows
#[derive(Debug, Deserialize, Validate)]
pub struct ExpandRequest {
    #[validate(length(min = 1, max = 128))]
    pub paper_id: String,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// Citation neighbourhood of a paper, centered at the origin
pub async fn get_graph(
    State(state): State<AppState>,
    Path(paper_id): Path<String>,
) -> Result<Json<GraphView>> {
    let hood = state.graph.neighbors(&paper_id).await?;
    metrics::record_graph("fetch");

    tracing::debug!(
        paper_id = %hood.center.id,
        neighbours = hood.adjacent.len(),
        "Graph fetched"
    );
    Ok(Json(GraphView::from_neighborhood(&hood, Position::default())))
}

/// Add a paper's neighbourhood to the client's graph.
///
/// The neighbourhood is laid out around the clicked node's current position
/// and merged without moving or replacing nodes the client already has.
pub async fn expand_graph(
    State(state): State<AppState>,
    Json(request): Json<ExpandRequest>,
) -> Result<Json<GraphView>> {
    request.validate().map_err(invalid_request)?;

    let hood = state.graph.neighbors(&request.paper_id).await?;
    metrics::record_graph("expand");

    let existing = GraphView {
        nodes: request.nodes,
        edges: request.edges,
    };
    let anchor = existing
        .position_of(&hood.center.id.to_string())
        .unwrap_or_default();

    let fetched = GraphView::from_neighborhood(&hood, anchor);
    Ok(Json(existing.merged_with(&fetched)))
}
