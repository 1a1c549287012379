use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::http::middleware::admin_auth;
use crate::http::routes::{admin, health};
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/v2/admin/comments/status",
            get(admin::comments_sync::get_comments_status),
        )
        .route(
            "/v2/admin/comments/sync",
            post(admin::comments_sync::post_comments_sync),
        )
        .route(
            "/v2/admin/comments/sync/{post_id}",
            post(admin::comments_sync::post_comments_sync_post),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth::require_admin,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
