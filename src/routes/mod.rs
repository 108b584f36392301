// Route modules
pub mod credit_sessions;
pub mod members;
pub mod orders;

use crate::{app_state::AppState, middleware::logging_middleware};
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes())
        .layer(middleware::from_fn(logging_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API v1 routes. Internal network only, no authentication.
fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/members/{user_id}", get(members::get_member))
        .route("/members/{user_id}/bills", get(members::get_member_bills))
        .route(
            "/credit-sessions/{record_id}/confirm",
            post(credit_sessions::confirm_session),
        )
        .route(
            "/credit-sessions/{record_id}/retrieve",
            post(credit_sessions::retrieve_session),
        )
        .route("/orders/{order_id}/cancel", post(orders::cancel_order))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
