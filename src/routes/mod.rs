//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - the intake API under `/api/v1/...`
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/categories", post(http::http_post_category))
        .route("/api/v1/questions", post(http::http_post_question))
        .route(
            "/api/v1/questions/:id",
            get(http::http_get_question)
                .put(http::http_put_question)
                .delete(http::http_delete_question),
        )
        .route("/api/v1/responses", post(http::http_post_response))
        .route("/api/v1/responses/token", post(http::http_post_response_with_token))
        .route("/api/v1/responses/:id", get(http::http_get_response))
        .route("/api/v1/surveys/:survey_id/questions", get(http::http_get_survey_questions))
        .route("/api/v1/surveys/:survey_id/responses", get(http::http_get_survey_responses))
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
}
