use std::sync::Arc;

use axum::{routing::get, Router};

use account_cell::router::{auth_routes, user_routes};
use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/users", user_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
}
