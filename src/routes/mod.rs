use crate::models::AppState;
use axum::{Json, Router, routing::get};

pub mod appointment_routes;
pub mod auth_routes;
pub mod branch_routes;
pub mod client_routes;
pub mod notification_routes;
pub mod realtime_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest("/api/v1/realtime", realtime_routes::router())
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", branch_routes::router())
        .nest("/api/v1", client_routes::router())
        .nest("/api/v1", notification_routes::router())
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
        .with_state(state)
}
