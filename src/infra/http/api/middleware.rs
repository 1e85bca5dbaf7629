use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::infra::auth::AuthError;

use super::error::{ApiError, codes};
use super::state::ApiState;

/// Resolve the bearer token into a `Principal` request extension.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers().get(AUTHORIZATION)) else {
        return ApiError::unauthorized().into_response();
    };

    let principal = match state.tokens.verify(token) {
        Ok(principal) => principal,
        Err(AuthError::Expired) => {
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::TOKEN_EXPIRED,
                "Bearer token expired",
                None,
            )
            .into_response();
        }
        Err(err) => {
            debug!(
                target = "sharelist::api::auth",
                error = %err,
                "bearer token rejected"
            );
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::UNAUTHORIZED,
                "Bearer token rejected",
                None,
            )
            .into_response();
        }
    };

    request.extensions_mut().insert(principal);
    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        let value = HeaderValue::from_static("Bearer abc.def");
        assert_eq!(extract_token(Some(&value)), Some("abc.def"));

        let value = HeaderValue::from_static("Basic abc");
        assert_eq!(extract_token(Some(&value)), None);

        let value = HeaderValue::from_static("Bearer   ");
        assert_eq!(extract_token(Some(&value)), None);
        assert_eq!(extract_token(None), None);
    }
}
