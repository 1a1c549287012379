use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::state::{AppState, SyncHealthState};
use ghostsky_infra::db::{DbPoolError, connect_lazy};

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("db error: {0}")]
    Db(#[from] DbPoolError),
}

pub fn build_state(config: AppConfig) -> Result<AppState, WiringError> {
    let client = Client::builder().timeout(config.request_timeout).build()?;
    let db = match config.database_url.as_deref() {
        Some(url) => Some(connect_lazy(url, config.request_timeout)?),
        None => None,
    };
    Ok(AppState {
        config: Arc::new(config),
        http_client: client,
        db,
        sync_health: Arc::new(Mutex::new(SyncHealthState::default())),
        sync_lock: Arc::new(Mutex::new(())),
    })
}
