pub mod scheduler;
pub mod tasks;

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::state::AppState;
use ghostsky_core::error::PortError;
use ghostsky_infra::db::RepoError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("sync already running")]
    Busy,
    #[error("db error: {0}")]
    Repo(#[from] RepoError),
    #[error("store error: {0}")]
    Port(#[from] PortError),
    #[error("comments error: {0}")]
    Comments(String),
}

const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(30);

pub async fn start(state: AppState) -> Result<(), JobError> {
    if state.db.is_none() {
        warn!("db not configured; comments sync disabled");
        return Ok(());
    }
    if !tasks::comments_sync::is_enabled(&state.config) {
        warn!("bluesky credentials or shim url missing; comments sync disabled");
        return Ok(());
    }
    let interval = state.config.sync_interval;
    if interval.is_zero() {
        info!("sync interval is zero; scheduled comments sync disabled");
        return Ok(());
    }

    scheduler::run_interval("comments_sync", interval, RETRY_AFTER_FAILURE, move || {
        let state = state.clone();
        async move {
            let report = tasks::comments_sync::run(&state).await?;
            info!(
                posts = report.posts_processed(),
                new_comments = report.new_comments(),
                errors = report.error_count(),
                skipped_accounts = report.skipped_accounts.len(),
                "comments sync complete"
            );
            Ok(())
        }
    })
    .await
}
