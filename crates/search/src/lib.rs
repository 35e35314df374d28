//! ResearchGraph retrieval
//!
//! - Paper-scoped vector retrieval over stored chunk embeddings
//! - Citation neighbourhoods and their node/edge views
//! - Idempotent merging of graph expansions

pub mod citation;
pub mod retrieval;

pub use citation::{
    arrange_satellites, merge, CitationGraphRepository, CitationLink, Difficulty, GraphEdge,
    GraphNode, GraphView, LinkKind, Neighborhood, NodeData, Position,
};
pub use retrieval::{RetrievedChunk, VectorRetriever};
