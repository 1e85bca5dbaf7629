pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::infra::http::middleware::log_responses;

pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();

    Router::new()
        .route(
            "/api/v1/items",
            get(handlers::list_items).post(handlers::create_item),
        )
        .route(
            "/api/v1/items/{id}",
            put(handlers::update_item).delete(handlers::delete_item),
        )
        .route(
            "/api/v1/items/{id}/like",
            post(handlers::like_item).delete(handlers::unlike_item),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ))
        .layer(axum_middleware::from_fn(log_responses))
}
