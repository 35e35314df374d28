//! Paper chat handler

use axum::{extract::State, Json};
use researchgraph_common::errors::Result;
use researchgraph_context::{ChatReply, ChatRequest};
use validator::Validate;

use super::invalid_request;
use crate::AppState;

/// Answer a question about a paper, from cache when possible
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>> {
    request.validate().map_err(invalid_request)?;

    let reply = state.chat.ask(&request).await?;
    Ok(Json(reply))
}
