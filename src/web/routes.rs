//! Route table of the HTTP API.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;
use super::state::AppState;

/// Build the router with every API endpoint.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Search
        .route("/api/v1/search", get(handlers::search))
        .route("/api/v1/semantic-search", get(handlers::semantic_search))
        .route("/api/v1/keyword-search", get(handlers::keyword_search))
        // Catalog
        .route(
            "/api/v1/questions",
            post(handlers::create_question).get(handlers::list_questions),
        )
        .route("/api/v1/questions/bulk", post(handlers::bulk_create_questions))
        .route(
            "/api/v1/questions/{id}",
            get(handlers::get_question)
                .patch(handlers::update_question)
                .delete(handlers::delete_question),
        )
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(state)
}
