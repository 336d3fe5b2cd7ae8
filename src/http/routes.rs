use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::service_status))
        // Voice command recognition
        .route("/voice/recognize", post(handlers::recognize_stream))
        .route("/voice/record/start", post(handlers::start_recording))
        .route(
            "/voice/record/stop/:stream_id",
            post(handlers::stop_recording),
        )
        .route("/voice/text", post(handlers::recognize_text))
        // Command execution
        .route("/voice/execute", post(handlers::execute_command))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Head-unit UIs call from a webview origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
