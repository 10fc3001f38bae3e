//! Bet list API endpoints

use super::{api_error, ApiError};
use crate::api::routes::selection::SelectionView;
use crate::api::server::AppState;
use crate::selection::Summary;
use crate::types::{BetList, BetListDetail, OddDetail, WinLoseCount};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct BetListsResponse {
    pub bet_lists: Vec<BetList>,
    pub total: usize,
}

/// A resolved bet list with its outcome
#[derive(Debug, Serialize)]
pub struct ResolvedBetListView {
    pub bet_list_name: String,
    pub is_winning: bool,
    pub losing_count: usize,
    pub match_count: usize,
    pub total_price: f64,
    pub odds: Vec<OddDetail>,
}

#[derive(Debug, Serialize)]
pub struct ResolvedResponse {
    pub bet_lists: Vec<ResolvedBetListView>,
    pub counts: WinLoseCount,
}

#[derive(Debug, Deserialize)]
pub struct AmountQuery {
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct BetListDetailResponse {
    #[serde(flatten)]
    pub detail: BetListDetail,
    pub summary: Summary,
}

/// Bet lists still waiting on a match
pub async fn list_on_going(State(state): State<AppState>) -> Result<Json<BetListsResponse>, ApiError> {
    let bet_lists = state
        .query
        .on_going_bet_lists(state.now())
        .await
        .map_err(api_error)?;

    Ok(Json(BetListsResponse {
        total: bet_lists.len(),
        bet_lists,
    }))
}

/// Bet lists whose matches have all been played
pub async fn list_resolved(State(state): State<AppState>) -> Result<Json<ResolvedResponse>, ApiError> {
    let lists = state
        .query
        .resolved_bet_lists(state.now())
        .await
        .map_err(api_error)?;
    let counts = WinLoseCount::from_lists(&lists);

    let bet_lists = lists
        .into_iter()
        .map(|list| ResolvedBetListView {
            is_winning: list.is_winning(),
            losing_count: list.losing_count(),
            match_count: list.match_count(),
            total_price: list.total_price(),
            bet_list_name: list.bet_list_name,
            odds: list.odds,
        })
        .collect();

    Ok(Json(ResolvedResponse { bet_lists, counts }))
}

/// One bet list with its odds and totals for the given stake
pub async fn get_bet_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<AmountQuery>,
) -> Result<Json<BetListDetailResponse>, ApiError> {
    let amount = state
        .config
        .bet_amount(query.amount)
        .map_err(|e| super::bad_request(e.to_string()))?;
    let detail = state.query.bet_list_detail(&name).await.map_err(api_error)?;
    let summary = Summary::from_odds(&detail.odds, amount).map_err(|w| api_error(w.into()))?;

    Ok(Json(BetListDetailResponse { detail, summary }))
}

pub async fn delete_bet_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .query
        .local()
        .delete_bet_list(&name)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Load a saved bet list into the session for editing
pub async fn edit_bet_list(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SelectionView>, ApiError> {
    let detail = state.query.bet_list_detail(&name).await.map_err(api_error)?;

    let mut session = state.session.lock().await;
    session.begin_update(detail);
    Ok(Json(SelectionView::new(&session, state.config.min_odds_warning)))
}
