//! HTTP control plane: route table and middleware stack.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::limits::{create_connection_limiter, create_rate_limiter};
use crate::metrics::metrics_handler;
use crate::state::AppState;

/// Build the full axum router for the control plane, with CORS, tracing,
/// request logging, and the rate/connection limiters layered on top of the
/// route table.
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limiter = create_rate_limiter(&state.config);
    let connection_limiter = create_connection_limiter(&state.config);

    let mut router = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/version", get(handlers::version_check))
        .route("/metrics", get(metrics_handler))
        .route("/channels", get(handlers::list_channels).post(handlers::start_channel))
        .route(
            "/channels/{channel_id}",
            get(handlers::get_channel).delete(handlers::stop_channel),
        )
        .route("/channels/{channel_id}/blocks", post(handlers::feed_block))
        .route("/channels/{channel_id}/preview", post(handlers::load_preview))
        .route("/channels/{channel_id}/switch_to_live", post(handlers::switch_to_live))
        .route(
            "/channels/{channel_id}/sink",
            post(handlers::attach_output_sink).delete(handlers::detach_output_sink),
        )
        .layer(from_fn_with_state(connection_limiter, crate::limits::connection_limit_middleware))
        .layer(from_fn_with_state(rate_limiter, crate::limits::rate_limit_middleware))
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}
