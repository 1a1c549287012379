use std::sync::Arc;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::{AppConfig, ThreadStrategy};
use crate::jobs::JobError;
use crate::reconcile::{ReconcileSettings, Reconciler, eligible_post};
use crate::state::{AppState, RunSummary};
use ghostsky_core::domain::comments::{SkippedAccount, SyncReport, SyncResult};
use ghostsky_core::ports::{CommentAdapter, MappingStore, PostStore, ThreadSource};
use ghostsky_core::types::at_uri::AtUri;
use ghostsky_infra::bluesky::{
    BlueskyClient, BlueskyCredentials, NotificationScanSource, ThreadWalkSource,
};
use ghostsky_infra::db::{AccountRecord, PgStore, list_enabled_accounts};
use ghostsky_infra::shim::ShimClient;

const SINGLE_TENANT_ACCOUNT: &str = "default";

/// One tenant's clients plus the slice of posts it owns.
pub struct AccountScope {
    pub account_id: String,
    /// `None` selects every syncable post.
    pub posts_filter: Option<String>,
    pub source: Arc<dyn ThreadSource>,
    pub adapter: Arc<dyn CommentAdapter>,
}

pub fn is_enabled(config: &AppConfig) -> bool {
    config.database_url.is_some()
        && (config.multi_tenant
            || (config.bluesky_identifier.is_some()
                && config.bluesky_app_password.is_some()
                && config.shim_url.is_some()))
}

/// Waits for any running batch, then runs one.
pub async fn run(state: &AppState) -> Result<SyncReport, JobError> {
    let _guard = state.sync_lock.lock().await;
    run_locked(state).await
}

/// Runs a batch unless one is already in progress.
pub async fn try_run(state: &AppState) -> Result<SyncReport, JobError> {
    let _guard = state.sync_lock.try_lock().map_err(|_| JobError::Busy)?;
    run_locked(state).await
}

pub async fn run_post(state: &AppState, post_id: &str) -> Result<SyncResult, JobError> {
    let _guard = state.sync_lock.try_lock().map_err(|_| JobError::Busy)?;
    let Some(pool) = state.db.as_ref() else {
        return Err(JobError::Comments("db not configured".to_string()));
    };
    let store = PgStore::new(pool.clone());
    let Some(post) = store.find_post(post_id).await? else {
        return Ok(SyncResult::fatal(post_id, format!("post {post_id} not found")));
    };
    let scope = if state.config.multi_tenant {
        let Some(account_id) = post.account_id.as_deref() else {
            return Ok(SyncResult::fatal(
                post_id,
                format!("post {post_id} has no account"),
            ));
        };
        let accounts = list_enabled_accounts(pool).await?;
        let Some(account) = accounts.into_iter().find(|account| account.id == account_id) else {
            return Ok(SyncResult::fatal(
                post_id,
                format!("account {account_id} is not enabled"),
            ));
        };
        account_scope(state, account)
    } else {
        single_tenant_scope(state)?
    };
    let settings = reconcile_settings(&state.config);
    Ok(sync_single(&store, &store, &scope, post_id, &settings).await)
}

async fn run_locked(state: &AppState) -> Result<SyncReport, JobError> {
    {
        let mut health = state.sync_health.lock().await;
        health.last_run_at = Some(Utc::now());
    }
    let Some(pool) = state.db.as_ref() else {
        return Err(JobError::Comments("db not configured".to_string()));
    };
    let store = PgStore::new(pool.clone());
    let scopes = if state.config.multi_tenant {
        list_enabled_accounts(pool)
            .await?
            .into_iter()
            .map(|account| account_scope(state, account))
            .collect()
    } else {
        vec![single_tenant_scope(state)?]
    };
    let settings = reconcile_settings(&state.config);

    let run_id = Uuid::new_v4();
    let span = info_span!("comments_sync", %run_id);
    let report = sync_scopes(&store, &store, &scopes, &settings)
        .instrument(span)
        .await;

    let summary = RunSummary {
        posts_processed: report.posts_processed(),
        new_comments: report.new_comments(),
        errors: report.error_count(),
        skipped_accounts: report.skipped_accounts.len(),
    };
    info!(%run_id, ?summary, "comments sync finished");
    {
        let mut health = state.sync_health.lock().await;
        health.last_success_at = Some(Utc::now());
        health.last_summary = Some(summary);
    }
    Ok(report)
}

/// Processes every scope in turn. A scope whose adapter is unhealthy, whose
/// posts cannot be listed, or whose source fails to prepare is skipped as a
/// whole; everything else lands in a per-post result.
pub async fn sync_scopes(
    posts: &dyn PostStore,
    mappings: &dyn MappingStore,
    scopes: &[AccountScope],
    settings: &ReconcileSettings,
) -> SyncReport {
    let mut report = SyncReport::default();
    for scope in scopes {
        let skip = |reason: String| {
            warn!(account_id = %scope.account_id, reason = %reason, "skipping account");
            SkippedAccount {
                account_id: scope.account_id.clone(),
                reason,
            }
        };

        if !adapter_healthy(scope, settings).await {
            report
                .skipped_accounts
                .push(skip("comment adapter unhealthy".to_string()));
            continue;
        }
        let eligible = match posts.list_syncable_posts(scope.posts_filter.as_deref()).await {
            Ok(eligible) => eligible,
            Err(err) => {
                report
                    .skipped_accounts
                    .push(skip(format!("failed to list posts: {err}")));
                continue;
            }
        };
        if eligible.is_empty() {
            info!(account_id = %scope.account_id, "no syncable posts");
            continue;
        }
        let roots: Vec<AtUri> = eligible
            .iter()
            .filter_map(|post| post.thread_uri.clone())
            .collect();
        if let Err(err) = prepare(scope, &roots, settings).await {
            report
                .skipped_accounts
                .push(skip(format!("thread source unavailable: {err}")));
            continue;
        }

        let reconciler = Reconciler {
            posts,
            mappings,
            source: scope.source.as_ref(),
            adapter: scope.adapter.as_ref(),
            settings,
        };
        for post in &eligible {
            let result = match reconciler.sync_post(&post.id).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, post_id = %post.id, "post sync failed");
                    SyncResult::fatal(&post.id, err.to_string())
                }
            };
            report.results.push(result);
        }
        info!(
            account_id = %scope.account_id,
            posts = eligible.len(),
            "account synced"
        );
    }
    report
}

/// Single-post variant of [`sync_scopes`]. An ineligible post is reported
/// before any external call; scope-level failures become the post's fatal
/// error.
pub async fn sync_single(
    posts: &dyn PostStore,
    mappings: &dyn MappingStore,
    scope: &AccountScope,
    post_id: &str,
    settings: &ReconcileSettings,
) -> SyncResult {
    let post = match posts.find_post(post_id).await {
        Ok(post) => post,
        Err(err) => return SyncResult::fatal(post_id, format!("post lookup failed: {err}")),
    };
    let post = match eligible_post(post_id, post) {
        Ok(post) => post,
        Err(result) => return result,
    };
    if !adapter_healthy(scope, settings).await {
        return SyncResult::fatal(post_id, "comment adapter unhealthy");
    }
    if let Err(err) = prepare(scope, &[post.thread_uri], settings).await {
        return SyncResult::fatal(post_id, format!("thread source unavailable: {err}"));
    }
    let reconciler = Reconciler {
        posts,
        mappings,
        source: scope.source.as_ref(),
        adapter: scope.adapter.as_ref(),
        settings,
    };
    match reconciler.sync_post(post_id).await {
        Ok(result) => result,
        Err(err) => SyncResult::fatal(post_id, err.to_string()),
    }
}

async fn adapter_healthy(scope: &AccountScope, settings: &ReconcileSettings) -> bool {
    timeout(settings.call_timeout, scope.adapter.health_check())
        .await
        .unwrap_or(false)
}

async fn prepare(
    scope: &AccountScope,
    roots: &[AtUri],
    settings: &ReconcileSettings,
) -> Result<(), ghostsky_core::error::PortError> {
    match timeout(settings.call_timeout, scope.source.prepare(roots)).await {
        Ok(result) => result,
        Err(_) => Err(ghostsky_core::error::PortError::Timeout(settings.call_timeout)),
    }
}

fn reconcile_settings(config: &AppConfig) -> ReconcileSettings {
    ReconcileSettings {
        call_timeout: config.call_timeout,
        profile_base_url: config.profile_base_url.clone(),
    }
}

fn single_tenant_scope(state: &AppState) -> Result<AccountScope, JobError> {
    let config = &state.config;
    let (Some(identifier), Some(app_password), Some(shim_url)) = (
        config.bluesky_identifier.clone(),
        config.bluesky_app_password.clone(),
        config.shim_url.as_deref(),
    ) else {
        return Err(JobError::Comments(
            "bluesky credentials or shim url not configured".to_string(),
        ));
    };
    let credentials = BlueskyCredentials {
        service_url: config.bluesky_service_url.clone(),
        identifier,
        app_password,
    };
    Ok(AccountScope {
        account_id: SINGLE_TENANT_ACCOUNT.to_string(),
        posts_filter: None,
        source: thread_source(state, credentials),
        adapter: shim_adapter(state, shim_url, config.shim_secret.clone()),
    })
}

fn account_scope(state: &AppState, account: AccountRecord) -> AccountScope {
    let credentials = BlueskyCredentials {
        service_url: account.bluesky_service_url,
        identifier: account.bluesky_identifier,
        app_password: account.bluesky_app_password,
    };
    AccountScope {
        source: thread_source(state, credentials),
        adapter: shim_adapter(state, &account.shim_url, account.shim_secret),
        posts_filter: Some(account.id.clone()),
        account_id: account.id,
    }
}

fn thread_source(state: &AppState, credentials: BlueskyCredentials) -> Arc<dyn ThreadSource> {
    let config = &state.config;
    let client = Arc::new(BlueskyClient::new(
        state.http_client.clone(),
        credentials,
        config.backoff,
    ));
    match config.thread_strategy {
        ThreadStrategy::Walk => Arc::new(ThreadWalkSource::new(client, config.thread_depth)),
        ThreadStrategy::Notifications => {
            Arc::new(NotificationScanSource::new(client, config.notification_window))
        }
    }
}

fn shim_adapter(state: &AppState, shim_url: &str, secret: Option<String>) -> Arc<dyn CommentAdapter> {
    Arc::new(ShimClient::new(
        state.http_client.clone(),
        shim_url,
        secret,
        state.config.call_timeout,
    ))
}
