//! Citation graph exploration
//!
//! Neighbourhoods are read from each paper's stored reference and cited-by
//! lists. Referenced papers that were never ingested are left out.

mod graph;
mod merge;
mod view;

pub use graph::{CitationGraphRepository, CitationLink, LinkKind, Neighborhood};
pub use merge::merge;
pub use view::{arrange_satellites, Difficulty, GraphEdge, GraphNode, GraphView, NodeData, Position};
