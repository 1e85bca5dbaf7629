//! Item handlers.
//!
//! Every handler runs behind `api_auth`, so a `Principal` extension is always present.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sharelist_api_types::{
    CreateItemRequest, ItemList, LikeResponse, UpdateItemRequest,
};

use crate::application::items::{CreateItemCommand, ItemServiceError, UpdateItemCommand};
use crate::application::repos::RepoError;
use crate::domain::entities::{ItemId, LikeOutcome};
use crate::domain::error::DomainError;
use crate::infra::auth::Principal;

use super::error::{ApiError, codes};
use super::state::ApiState;

pub async fn list_items(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .items
        .list(principal.user_id)
        .await
        .map_err(item_to_api)?;

    Ok(Json(ItemList {
        items: items.into_iter().map(|item| item.into_wire()).collect(),
    }))
}

pub async fn create_item(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(json_to_api)?;

    let record = state
        .items
        .create(
            principal.user_id,
            CreateItemCommand {
                title: payload.title,
                completed: payload.completed,
            },
        )
        .await
        .map_err(item_to_api)?;

    Ok((StatusCode::CREATED, Json(record.into_wire(false))))
}

pub async fn update_item(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ItemId>,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(json_to_api)?;

    let record = state
        .items
        .update(
            id,
            UpdateItemCommand {
                title: payload.title,
                completed: payload.completed,
            },
        )
        .await
        .map_err(item_to_api)?;

    let user_has_liked = state
        .items
        .has_liked(record.id, principal.user_id)
        .await
        .map_err(item_to_api)?;

    Ok(Json(record.into_wire(user_has_liked)))
}

pub async fn delete_item(
    State(state): State<ApiState>,
    Extension(_principal): Extension<Principal>,
    Path(id): Path<ItemId>,
) -> Result<impl IntoResponse, ApiError> {
    state.items.delete(id).await.map_err(item_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_item(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ItemId>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .items
        .like_by_user(id, principal.user_id)
        .await
        .map_err(item_to_api)?;
    Ok(Json(like_response(outcome)))
}

pub async fn unlike_item(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ItemId>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .items
        .unlike_by_user(id, principal.user_id)
        .await
        .map_err(item_to_api)?;
    Ok(Json(like_response(outcome)))
}

fn like_response(outcome: LikeOutcome) -> LikeResponse {
    LikeResponse {
        item_id: outcome.item_id,
        liked: outcome.liked,
        changed: outcome.changed,
        like_count: outcome.like_count,
    }
}

// ----- Error conversions -----

fn json_to_api(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("Malformed request body", Some(rejection.body_text()))
}

pub(crate) fn item_to_api(err: ItemServiceError) -> ApiError {
    match err {
        ItemServiceError::Domain(DomainError::Validation { field, message }) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION,
            "Invalid item",
            Some(format!("{field}: {message}")),
        ),
        ItemServiceError::Domain(DomainError::NotFound { .. }) => {
            ApiError::not_found("item not found")
        }
        ItemServiceError::Repo(RepoError::NotFound) => ApiError::not_found("item not found"),
        ItemServiceError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(msg) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(msg),
        ),
    }
}
