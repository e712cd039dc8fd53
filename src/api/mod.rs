use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::AppState;

pub mod error;
pub mod handlers;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/intel/run", post(handlers::run_pipeline))
        .route("/api/intel/latest", get(handlers::latest_analysis))
        .route("/api/intel/analysis/:date", get(handlers::analysis_by_date))
        .route("/api/intel/narratives", get(handlers::narratives))
        .route("/api/intel/backtest", post(handlers::run_backtest))
        .route("/api/intel/scorecard", get(handlers::scorecard))
        .route("/api/intel/scorecard/history", get(handlers::scorecard_history))
        .route(
            "/api/intel/briefing/:date/export",
            get(handlers::export_briefing),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
