//! Axum server setup and configuration

use crate::api::routes;
use crate::{Config, LocalStore, QueryLayer, ReferenceStore, Session};
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub query: QueryLayer,
    /// The dashboard is single-user: one editing session for the process
    pub session: Arc<Mutex<Session>>,
    /// Pins the clock used by the time-based views
    pub fixed_now: Option<DateTime<Utc>>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let reference = ReferenceStore::open(&config.reference_db_path)
            .await
            .with_context(|| format!("Reference database {} unavailable", config.reference_db_path))?;
        let local = LocalStore::open(&config.local_db_path)
            .await
            .with_context(|| format!("Failed to open local database {}", config.local_db_path))?;

        let query = QueryLayer::open(Arc::new(reference), Arc::new(local)).await?;
        Ok(Self::with_layer(config, query))
    }

    pub fn with_stores(config: Config, reference: ReferenceStore, local: LocalStore) -> Self {
        Self::with_layer(config, QueryLayer::new(Arc::new(reference), Arc::new(local)))
    }

    fn with_layer(config: Config, query: QueryLayer) -> Self {
        Self {
            config: Arc::new(config),
            query,
            session: Arc::new(Mutex::new(Session::new())),
            fixed_now: None,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed_now.unwrap_or_else(Utc::now)
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // API routes
    let api_routes = Router::new()
        // Program
        .route("/program", get(routes::program::get_program))
        // Bet list routes
        .route("/bet-lists", get(routes::bet_lists::list_on_going))
        .route("/bet-lists/resolved", get(routes::bet_lists::list_resolved))
        .route(
            "/bet-lists/:name",
            get(routes::bet_lists::get_bet_list).delete(routes::bet_lists::delete_bet_list),
        )
        .route("/bet-lists/:name/edit", post(routes::bet_lists::edit_bet_list))
        // Selection routes
        .route("/selection", get(routes::selection::get_selection))
        .route("/selection/matches", post(routes::selection::enter_match))
        .route("/selection/matches/:code", delete(routes::selection::remove_match))
        .route("/selection/choice", post(routes::selection::choose_odd))
        .route("/selection/summary", get(routes::selection::get_summary))
        .route("/selection/save", post(routes::selection::save_selection))
        // Diagnostics
        .route("/query", post(routes::query::run_query));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
