use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{self, SharedState};

/// Create the main application router with all API endpoints
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Ingestion
        .route("/api/users/:user_id/statement", post(handlers::upload_statement))
        // Read endpoints
        .route("/api/users/:user_id/portfolio", get(handlers::get_portfolio))
        .route("/api/users/:user_id/holdings", get(handlers::get_holdings))
        .route(
            "/api/users/:user_id/transactions",
            get(handlers::get_transactions),
        )
        .with_state(state)
        // Add middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
