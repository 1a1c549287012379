use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::jobs::JobError;
use crate::jobs::tasks::comments_sync;
use crate::state::{AppState, RunSummary};
use ghostsky_core::domain::comments::{SkippedAccount, SyncReport, SyncResult};
use ghostsky_infra::db::{RepoError, fetch_mappings_overview};

#[derive(Debug, Error)]
pub enum CommentsAdminError {
    #[error("db not configured")]
    DbUnavailable,
    #[error("comments sync not configured")]
    Disabled,
    #[error("sync already running")]
    Busy,
    #[error("db error: {0}")]
    Db(#[from] RepoError),
    #[error("job error: {0}")]
    Job(JobError),
}

impl From<JobError> for CommentsAdminError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Busy => CommentsAdminError::Busy,
            other => CommentsAdminError::Job(other),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
pub struct CommentsSyncResponse {
    action: &'static str,
    posts_processed: usize,
    new_comments: usize,
    errors: usize,
    results: Vec<SyncResult>,
    skipped_accounts: Vec<SkippedAccount>,
}

impl From<SyncReport> for CommentsSyncResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            action: "sync",
            posts_processed: report.posts_processed(),
            new_comments: report.new_comments(),
            errors: report.error_count(),
            results: report.results,
            skipped_accounts: report.skipped_accounts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentsStatusResponse {
    enabled: bool,
    syncable_posts: i64,
    mappings: i64,
    last_recorded_at: Option<String>,
    last_run_at: Option<String>,
    last_success_at: Option<String>,
    last_summary: Option<RunSummary>,
}

pub async fn post_comments_sync(
    State(state): State<AppState>,
) -> Result<Json<CommentsSyncResponse>, CommentsAdminError> {
    ensure_comments_configured(&state)?;
    let report = comments_sync::try_run(&state).await?;
    Ok(Json(report.into()))
}

pub async fn post_comments_sync_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<SyncResult>, CommentsAdminError> {
    ensure_comments_configured(&state)?;
    let result = comments_sync::run_post(&state, &post_id).await?;
    Ok(Json(result))
}

pub async fn get_comments_status(
    State(state): State<AppState>,
) -> Result<Json<CommentsStatusResponse>, CommentsAdminError> {
    let pool = state.db.as_ref().ok_or(CommentsAdminError::DbUnavailable)?;
    let overview = fetch_mappings_overview(pool).await?;
    let health = state.sync_health.lock().await.clone();
    Ok(Json(CommentsStatusResponse {
        enabled: comments_sync::is_enabled(&state.config),
        syncable_posts: overview.syncable_posts,
        mappings: overview.mappings,
        last_recorded_at: format_timestamp(overview.last_recorded_at),
        last_run_at: format_timestamp(health.last_run_at),
        last_success_at: format_timestamp(health.last_success_at),
        last_summary: health.last_summary,
    }))
}

impl IntoResponse for CommentsAdminError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            CommentsAdminError::DbUnavailable | CommentsAdminError::Disabled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CommentsAdminError::Busy => StatusCode::CONFLICT,
            CommentsAdminError::Db(_) | CommentsAdminError::Job(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

fn ensure_comments_configured(state: &AppState) -> Result<(), CommentsAdminError> {
    if state.db.is_none() {
        return Err(CommentsAdminError::DbUnavailable);
    }
    if !comments_sync::is_enabled(&state.config) {
        return Err(CommentsAdminError::Disabled);
    }
    Ok(())
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|timestamp| timestamp.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::{CommentsAdminError, CommentsSyncResponse};
    use crate::jobs::JobError;
    use ghostsky_core::domain::comments::{SyncReport, SyncResult};

    #[test]
    fn busy_job_maps_to_conflict() {
        let err = CommentsAdminError::from(JobError::Busy);
        assert!(matches!(err, CommentsAdminError::Busy));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err = CommentsAdminError::from(JobError::Comments("boom".to_string()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn sync_response_carries_totals() {
        let mut ok = SyncResult::new("p1");
        ok.new_comments = 3;
        let report = SyncReport {
            results: vec![ok, SyncResult::fatal("p2", "failed to fetch thread")],
            skipped_accounts: Vec::new(),
        };
        let value = serde_json::to_value(CommentsSyncResponse::from(report)).unwrap();
        assert_eq!(value["action"], "sync");
        assert_eq!(value["posts_processed"], 2);
        assert_eq!(value["new_comments"], 3);
        assert_eq!(value["errors"], 1);
        assert_eq!(value["results"][1]["post_id"], "p2");
    }
}
