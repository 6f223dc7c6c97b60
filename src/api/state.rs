//! State shared across handlers

use crate::query::QueryService;
use crate::sync::{PointsSyncJob, TokenSyncJob};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    /// Run in the background by `/trigger-cache`
    pub token_job: Arc<TokenSyncJob>,
    /// Run in the background by `/trigger-points-update`
    pub points_job: Arc<PointsSyncJob>,
}

impl AppState {
    pub fn new(
        query: Arc<QueryService>,
        token_job: Arc<TokenSyncJob>,
        points_job: Arc<PointsSyncJob>,
    ) -> Self {
        Self {
            query,
            token_job,
            points_job,
        }
    }
}
