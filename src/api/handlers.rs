//! Request handlers

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::query::{DatabaseStatus, Leaderboard, TokenList};
use crate::sync::{PointsCycleStatus, PointsRecord, SyncError};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokensQuery {
    pub address: Option<String>,
}

/// GET /tokens?address=
pub async fn get_tokens(
    State(state): State<AppState>,
    Query(query): Query<TokensQuery>,
) -> ApiResult<Json<TokenList>> {
    Ok(Json(state.query.tokens(query.address.as_deref()).await?))
}

/// GET /database-status
pub async fn get_database_status(State(state): State<AppState>) -> ApiResult<Json<DatabaseStatus>> {
    Ok(Json(state.query.database_status().await?))
}

/// GET /trigger-cache
///
/// Starts a token pass in the background and returns at once.
pub async fn trigger_cache(State(state): State<AppState>) -> &'static str {
    let job = state.token_job.clone();
    tokio::spawn(async move {
        log::info!("🔔 Token pass triggered over HTTP");
        if let Err(e) = job.run().await {
            log::error!("❌ Triggered token pass failed: {}", e);
        }
    });
    "Cache build process triggered."
}

/// GET /trigger-recovery
pub async fn trigger_recovery(State(state): State<AppState>) -> &'static str {
    let job = state.token_job.clone();
    tokio::spawn(async move {
        log::info!("🔔 Token recovery triggered over HTTP");
        if let Err(e) = job.recover_missing().await {
            log::error!("❌ Triggered token recovery failed: {}", e);
        }
    });
    "Recovery process triggered."
}

/// GET /trigger-points-update
pub async fn trigger_points_update(State(state): State<AppState>) -> &'static str {
    let job = state.points_job.clone();
    tokio::spawn(async move {
        log::info!("🔔 Points cycle triggered over HTTP");
        match job.run().await {
            Ok(_) => {}
            Err(SyncError::LockContention) => {
                log::info!("⏭️  Triggered points cycle skipped, lock held");
            }
            Err(e) => log::error!("❌ Triggered points cycle failed: {}", e),
        }
    });
    "Points update process triggered."
}

/// GET /points-leaderboard
pub async fn get_points_leaderboard(State(state): State<AppState>) -> ApiResult<Json<Leaderboard>> {
    Ok(Json(state.query.leaderboard().await?))
}

/// GET /points/{address}
pub async fn get_points(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<PointsRecord>> {
    Ok(Json(state.query.points_for_address(&address).await?))
}

/// GET /points-update-status
pub async fn get_points_update_status(
    State(state): State<AppState>,
) -> ApiResult<Json<PointsCycleStatus>> {
    state
        .query
        .points_update_status()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No points update has run yet".to_string()))
}
