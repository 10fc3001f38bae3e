//! Selection API endpoints
//!
//! Drive the editing session: tick matches, choose one odd per match, check
//! the totals and save.

use super::{api_error, ApiError};
use crate::api::server::AppState;
use crate::error::{Error, ValidationWarning};
use crate::selection::Summary;
use crate::session::{EditMode, Session};
use crate::types::{OddDetail, UpsertOutcome};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct SelectedMatch {
    pub odd_match_code: i64,
    pub chosen: Option<OddDetail>,
}

/// Current state of the editing session
#[derive(Debug, Serialize)]
pub struct SelectionView {
    pub mode: EditMode,
    pub editing: Option<String>,
    pub matches: Vec<SelectedMatch>,
    pub missing_choices: Vec<i64>,
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

impl SelectionView {
    pub fn new(session: &Session, min_odds: usize) -> Self {
        let selection = &session.selection;
        Self {
            mode: session.mode,
            editing: session.editing.clone(),
            matches: selection
                .match_codes()
                .map(|code| SelectedMatch {
                    odd_match_code: code,
                    chosen: selection.chosen(code).cloned(),
                })
                .collect(),
            missing_choices: selection.missing_choices(),
            is_valid: selection.is_valid(),
            warnings: selection.warnings(min_odds).iter().map(|w| w.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnterMatchRequest {
    pub odd_match_code: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChooseOddRequest {
    pub odd_match_code: i64,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: Summary,
    /// Totals of the list as saved, in update mode
    pub previous: Option<Summary>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub bet_list_name: String,
    pub outcome: UpsertOutcome,
    pub warnings: Vec<String>,
}

pub async fn get_selection(State(state): State<AppState>) -> Json<SelectionView> {
    let session = state.session.lock().await;
    Json(SelectionView::new(&session, state.config.min_odds_warning))
}

/// Tick an upcoming match. A match already in the selection keeps its choice.
pub async fn enter_match(
    State(state): State<AppState>,
    Json(req): Json<EnterMatchRequest>,
) -> Result<Json<SelectionView>, ApiError> {
    let odds = state
        .query
        .reference()
        .odds_for_match(req.odd_match_code)
        .await
        .map_err(api_error)?;
    if odds.is_empty() {
        return Err(api_error(Error::NotFound {
            entity: "Match",
            id: req.odd_match_code.to_string(),
        }));
    }
    if odds.iter().any(|o| o.match_datetime <= state.now()) {
        return Err(api_error(ValidationWarning::MatchStarted(req.odd_match_code).into()));
    }

    let mut session = state.session.lock().await;
    session.selection.enter_match(req.odd_match_code);
    Ok(Json(SelectionView::new(&session, state.config.min_odds_warning)))
}

/// Untick a match, dropping its choice
pub async fn remove_match(
    State(state): State<AppState>,
    Path(code): Path<i64>,
) -> Result<Json<SelectionView>, ApiError> {
    let mut session = state.session.lock().await;
    if !session.selection.remove_match(code) {
        return Err(api_error(Error::NotFound {
            entity: "Selected match",
            id: code.to_string(),
        }));
    }
    Ok(Json(SelectionView::new(&session, state.config.min_odds_warning)))
}

/// Choose the odd for a ticked match, replacing any earlier choice
pub async fn choose_odd(
    State(state): State<AppState>,
    Json(req): Json<ChooseOddRequest>,
) -> Result<Json<SelectionView>, ApiError> {
    let odd = state
        .query
        .reference()
        .odd_detail(&req.key)
        .await
        .map_err(api_error)?;

    let mut session = state.session.lock().await;
    session
        .selection
        .choose_odd(req.odd_match_code, odd)
        .map_err(api_error)?;
    Ok(Json(SelectionView::new(&session, state.config.min_odds_warning)))
}

/// Totals for the current selection. Refused while a match has no choice.
pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let amount = state
        .config
        .bet_amount(query.amount)
        .map_err(|e| super::bad_request(e.to_string()))?;

    let session = state.session.lock().await;
    let summary = session
        .selection
        .checked_summary(amount)
        .map_err(|w| api_error(w.into()))?;
    let previous = match session.mode {
        EditMode::Update => {
            Some(Summary::from_odds(&session.previous_odds, amount).map_err(|w| api_error(w.into()))?)
        }
        EditMode::Create => None,
    };

    Ok(Json(SummaryResponse {
        summary,
        previous,
        warnings: session
            .selection
            .warnings(state.config.min_odds_warning)
            .iter()
            .map(|w| w.to_string())
            .collect(),
    }))
}

/// Save the selection as a bet list and start a new one
pub async fn save_selection(
    State(state): State<AppState>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    let mut session = state.session.lock().await;
    let bet_list_name = session.target_name(&req.name).to_string();
    let warnings = session
        .selection
        .warnings(state.config.min_odds_warning)
        .iter()
        .map(|w| w.to_string())
        .collect();

    let outcome = session
        .save(&bet_list_name, state.query.local(), state.query.reference())
        .await
        .map_err(api_error)?;

    info!("Bet list '{}' {} via API", bet_list_name, outcome);
    Ok(Json(SaveResponse {
        bet_list_name,
        outcome,
        warnings,
    }))
}
