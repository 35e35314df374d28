//! API handlers module

pub mod chat;
pub mod discover;
pub mod graph;
pub mod health;

use researchgraph_common::errors::AppError;
use validator::ValidationErrors;

/// Map request validation failures, naming the first offending field
fn invalid_request(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|f| f.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}
