//! HTTP boundary for the schemalyze job engine.

pub mod cors;
pub mod error;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

pub use cors::AllowedOrigins;
pub use error::ServerError;
pub use state::AppState;

/// Builds the service router.
pub fn router(state: AppState, allowed_origins: AllowedOrigins) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/process", post(routes::jobs::process))
        .route("/status/:job_id", get(routes::jobs::status))
        .route("/jobs/:job_id/cancel", post(routes::jobs::cancel))
        .route("/detect", post(routes::debug::detect))
        .route("/ocr", post(routes::debug::ocr))
        .route("/events", get(routes::events::events))
        .layer(middleware::from_fn_with_state(allowed_origins, cors::cors))
        .with_state(state)
}
