pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::application::relay::RELAY_PATH;
use crate::infra::http::RouterState;
use crate::infra::http::middleware::log_responses;

pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route(RELAY_PATH, get(handlers::relay_image))
        .route("/api/profile/{handle}", get(handlers::get_profile))
        .route("/api/roles", get(handlers::list_roles))
        .route("/_health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}
