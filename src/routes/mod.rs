//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static client bundle from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/tests", get(http::http_list_tests))
        .route("/api/v1/tests/:test_id", get(http::http_get_test))
        .route("/api/v1/attempts", post(http::http_start_attempt))
        .route(
            "/api/v1/attempts/:attempt_id",
            get(http::http_get_attempt).delete(http::http_abandon_attempt),
        )
        .route("/api/v1/attempts/:attempt_id/begin", post(http::http_begin_attempt))
        .route("/api/v1/attempts/:attempt_id/events", post(http::http_post_event))
        .route("/api/v1/attempts/:attempt_id/submit", post(http::http_submit_attempt))
        .route("/api/v1/reports/:report_id", get(http::http_get_report))
        .route(
            "/api/v1/notebook",
            get(http::http_get_notebook)
                .post(http::http_save_to_notebook)
                .delete(http::http_remove_from_notebook),
        )
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
