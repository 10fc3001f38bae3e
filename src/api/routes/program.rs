//! Program API endpoint

use super::{api_error, ApiError};
use crate::api::server::AppState;
use crate::types::{OddLabel, ProgramRow};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ProgramQuery {
    /// Only matches of this competition
    pub competition: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ProgramResponse {
    /// Column order of the odds cells
    pub labels: Vec<&'static str>,
    pub matches: Vec<ProgramRow>,
    pub total: usize,
}

/// Upcoming matches with their odds side by side
pub async fn get_program(
    State(state): State<AppState>,
    Query(query): Query<ProgramQuery>,
) -> Result<Json<ProgramResponse>, ApiError> {
    let program = state.query.program(state.now()).await.map_err(api_error)?;

    let matches: Vec<ProgramRow> = program
        .into_iter()
        .filter(|row| match query.competition.as_deref() {
            Some(name) => row.competition_name.as_deref() == Some(name),
            None => true,
        })
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(Json(ProgramResponse {
        labels: OddLabel::all().map(|l| l.as_str()).collect(),
        total: matches.len(),
        matches,
    }))
}
