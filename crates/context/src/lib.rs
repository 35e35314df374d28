//! ResearchGraph answer engine
//!
//! - Cached question answering over a single paper
//! - Prompt assembly and answer generation
//! - Topic discovery with model-ranked reading paths

pub mod chat;
pub mod discovery;
pub mod generator;

pub use chat::{AnswerSource, ChatReply, ChatRequest, ChatService};
pub use discovery::{
    ArxivClient, CandidatePaper, DiscoverRequest, DiscoverResponse, LiteratureSearch,
    PaperSummary, ReadingPathPlanner,
};
pub use generator::{AnswerGenerator, GeneratedAnswer};
