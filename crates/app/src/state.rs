use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use ghostsky_infra::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub http_client: Client,
    pub db: Option<DbPool>,
    pub sync_health: Arc<Mutex<SyncHealthState>>,
    /// Held for the duration of a batch so scheduled and admin-triggered runs
    /// never overlap.
    pub sync_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncHealthState {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_summary: Option<RunSummary>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub posts_processed: usize,
    pub new_comments: usize,
    pub errors: usize,
    pub skipped_accounts: usize,
}
