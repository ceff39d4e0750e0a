use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/tokens", post(handlers::create_token))
        .route("/tokens/:token/status", get(handlers::token_status))
        .route("/tokens/:token/claim", post(handlers::claim_token))
        .route("/tokens/:token/consume", post(handlers::consume_token))
        .route("/tokens/:token/cancel", post(handlers::cancel_token))
        .route("/admin/cleanup", post(handlers::admin_cleanup))
        .route("/admin/stats", get(handlers::admin_stats))
        .route("/admin/tokens/:id", get(handlers::get_token_by_id))
        .route("/_internal/health", get(handlers::health));

    // Test-only routes -- dangerous operations gated behind TEST_MODE
    if state.config.test_mode {
        tracing::warn!("Test mode enabled — purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
