//! Diagnostic SQL endpoint

use super::{api_error, bad_request, ApiError};
use crate::api::server::AppState;
use crate::error::Error;
use crate::query::{Source, Table};
use axum::{extract::State, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub source: Source,
    pub sql: String,
}

/// Run free-form SQL against one of the databases.
/// SQL errors are the caller's mistake and come back as 400.
pub async fn run_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Table>, ApiError> {
    if req.sql.trim().is_empty() {
        return Err(bad_request("Empty query"));
    }

    match state.query.raw_query(req.source, &req.sql).await {
        Ok(table) => Ok(Json(table)),
        Err(Error::Database(e)) => Err(bad_request(e.to_string())),
        Err(e) => Err(api_error(e)),
    }
}
