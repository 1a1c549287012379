use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::config::ThreadStrategy;
use crate::jobs::tasks::comments_sync;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub modules: HealthModules,
}

#[derive(Debug, Serialize)]
pub struct HealthModules {
    pub database: DatabaseStatus,
    pub comments_sync: CommentsSyncStatus,
    pub admin: ModuleStatus,
}

#[derive(Debug, Serialize)]
pub struct ModuleStatus {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStatus {
    pub configured: bool,
}

#[derive(Debug, Serialize)]
pub struct CommentsSyncStatus {
    pub enabled: bool,
    pub multi_tenant: bool,
    pub strategy: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    let strategy = match config.thread_strategy {
        ThreadStrategy::Walk => "walk",
        ThreadStrategy::Notifications => "notifications",
    };
    Json(HealthResponse {
        status: "ok",
        modules: HealthModules {
            database: DatabaseStatus {
                configured: state.db.is_some(),
            },
            comments_sync: CommentsSyncStatus {
                enabled: comments_sync::is_enabled(config),
                multi_tenant: config.multi_tenant,
                strategy,
            },
            admin: ModuleStatus {
                enabled: config.admin_token.is_some(),
            },
        },
    })
}
