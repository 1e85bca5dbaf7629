pub mod api;
mod middleware;
pub mod ws;

pub use api::{ApiState, build_api_router};
pub use ws::WsState;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Router, middleware as axum_middleware};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::error::ErrorReport;
use crate::application::repos::{ItemsRepo, RepoError};
use crate::config::ServerSettings;

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn ItemsRepo>,
}

/// Assemble the full router: item API, WebSocket subscribe, health probe.
pub fn build_router(
    api: ApiState,
    ws: WsState,
    health: HealthState,
    server: &ServerSettings,
) -> Router {
    let ws_router = Router::new()
        .route("/ws", get(ws::subscribe))
        .with_state(ws);
    let health_router = Router::new()
        .route("/health", get(health_check))
        .with_state(health)
        .layer(axum_middleware::from_fn(middleware::log_responses));

    Router::new()
        .merge(build_api_router(api))
        .merge(ws_router)
        .merge(health_router)
        .layer(cors_layer(&server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health_check(State(state): State<HealthState>) -> Response {
    store_health_response(state.store.ping().await)
}

fn store_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    target = "sharelist::http::cors",
                    origin = origin.as_str(),
                    "ignoring unparsable CORS origin"
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
