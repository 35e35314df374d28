//! Topic discovery handler

use axum::{extract::State, Json};
use researchgraph_common::errors::Result;
use researchgraph_context::{DiscoverRequest, DiscoverResponse};
use validator::Validate;

use super::invalid_request;
use crate::AppState;

/// Search the literature on a topic and return an ordered reading path
pub async fn discover(
    State(state): State<AppState>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>> {
    request.validate().map_err(invalid_request)?;

    let response = state.discovery.discover(&request).await?;
    Ok(Json(response))
}
