mod cli;
mod config;
mod http;
mod jobs;
mod reconcile;
mod state;
#[cfg(test)]
mod testing;
mod wiring;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Mode};
use crate::config::ConfigError;
use crate::http::HttpError;
use crate::jobs::JobError;
use crate::jobs::tasks::comments_sync;
use crate::state::AppState;
use crate::wiring::WiringError;
use ghostsky_infra::db::{DbPoolError, run_migrations};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid cli: {0}")]
    InvalidCli(String),
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),
    #[error("db error: {0}")]
    Db(#[from] DbPoolError),
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    #[error("job error: {0}")]
    Jobs(#[from] JobError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    if cli.post.is_some() && !matches!(cli.mode, Mode::Once) {
        return Err(AppError::InvalidCli("--post requires --mode once".to_string()));
    }
    config::load_dotenv()?;
    let config = config::AppConfig::from_env()?;
    info!(?config, "configuration loaded");
    let state = wiring::build_state(config)?;
    if let Some(pool) = state.db.as_ref() {
        run_migrations(pool).await?;
    }

    if matches!(cli.mode, Mode::Once) {
        return run_once(&state, cli.post.as_deref()).await;
    }

    let mut api_task = None;
    let mut worker_task = None;

    if cli.mode.run_api() {
        let addr = state.config.http_addr;
        let http_state = state.clone();
        api_task = Some(tokio::spawn(async move {
            info!(%addr, "http server starting");
            http::serve(addr, http_state).await
        }));
    }

    if cli.mode.run_worker() {
        let worker_state = state.clone();
        worker_task = Some(tokio::spawn(async move {
            info!(interval = ?worker_state.config.sync_interval, "worker scheduler starting");
            jobs::start(worker_state).await
        }));
    }

    let shutdown = shutdown_signal();

    match (api_task, worker_task) {
        (Some(api), Some(worker)) => {
            tokio::select! {
                _ = shutdown => {
                    info!("shutdown signal received");
                }
                res = api => {
                    res??;
                }
                res = worker => {
                    res??;
                }
            }
        }
        (Some(api), None) => {
            tokio::select! {
                _ = shutdown => {
                    info!("shutdown signal received");
                }
                res = api => {
                    res??;
                }
            }
        }
        (None, Some(worker)) => {
            tokio::select! {
                _ = shutdown => {
                    info!("shutdown signal received");
                }
                res = worker => {
                    res??;
                }
            }
        }
        (None, None) => {}
    }

    Ok(())
}

/// Runs one batch (or one post) and prints the outcome as JSON.
async fn run_once(state: &AppState, post_id: Option<&str>) -> Result<(), AppError> {
    if !comments_sync::is_enabled(&state.config) {
        return Err(AppError::InvalidCli(
            "comments sync is not configured".to_string(),
        ));
    }
    let output = match post_id {
        Some(post_id) => {
            let result = comments_sync::run_post(state, post_id).await?;
            info!(
                post_id = %result.post_id,
                new_comments = result.new_comments,
                errors = result.errors.len(),
                "single post sync finished"
            );
            serde_json::to_string_pretty(&result)?
        }
        None => {
            let report = comments_sync::run(state).await?;
            serde_json::to_string_pretty(&report)?
        }
    };
    println!("{output}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
    }
}
