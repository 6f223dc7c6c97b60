//! Route configuration

use super::handlers;
use super::state::AppState;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

fn mirror_routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(handlers::get_tokens))
        .route("/database-status", get(handlers::get_database_status))
        .route("/trigger-cache", get(handlers::trigger_cache))
        .route("/trigger-recovery", get(handlers::trigger_recovery))
        .route("/trigger-points-update", get(handlers::trigger_points_update))
        .route("/points-leaderboard", get(handlers::get_points_leaderboard))
        .route("/points/{address}", get(handlers::get_points))
        .route("/points-update-status", get(handlers::get_points_update_status))
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(mirror_routes())
        .nest("/api", mirror_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
