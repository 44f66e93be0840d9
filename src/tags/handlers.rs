use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::AuthUser,
    error::ApiError,
    policy::{self, authorize},
    state::AppState,
};

use super::dto::{TagDeletedResponse, TagListResponse, TagNameRequest, TagResponse};
use super::repo::{DeleteOutcome, Tag};

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tag", get(list_tags))
        .route("/tag/create", post(create_tag))
        .route("/tag/:id/edit", patch(edit_tag))
        .route("/tag/:id/delete", delete(delete_tag))
}

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<TagListResponse>, ApiError> {
    authorize(policy::TAG_MANAGE, user.role)?;

    let tags = Tag::list(&state.db).await?;
    Ok(Json(TagListResponse {
        message: "Tags fetched successfully".into(),
        data: tags,
    }))
}

#[instrument(skip(state))]
pub async fn create_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<TagNameRequest>,
) -> Result<(StatusCode, Json<TagResponse>), ApiError> {
    authorize(policy::TAG_MANAGE, user.role)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let tag = match Tag::create(&state.db, name).await {
        Ok(t) => t,
        Err(e) if is_unique_violation(&e) => {
            warn!(name, "tag already exists");
            return Err(ApiError::bad_request("Tag already exists"));
        }
        Err(e) => return Err(ApiError::Internal(e)),
    };

    info!(tag_id = tag.id, "tag created");
    Ok((
        StatusCode::CREATED,
        Json(TagResponse {
            message: "Tag created successfully".into(),
            data: tag,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn edit_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<TagNameRequest>,
) -> Result<Json<TagResponse>, ApiError> {
    authorize(policy::TAG_MANAGE, user.role)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let tag = match Tag::rename(&state.db, id, name).await {
        Ok(Some(t)) => t,
        Ok(None) => return Err(ApiError::not_found("Tag not found")),
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::bad_request("Tag already exists"));
        }
        Err(e) => return Err(ApiError::Internal(e)),
    };

    Ok(Json(TagResponse {
        message: "Tag updated successfully".into(),
        data: tag,
    }))
}

#[instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<TagDeletedResponse>, ApiError> {
    authorize(policy::TAG_MANAGE, user.role)?;

    match Tag::delete_if_unused(&state.db, id).await? {
        DeleteOutcome::Deleted => {
            info!(tag_id = id, "tag deleted");
            Ok(Json(TagDeletedResponse {
                id,
                message: "Tag deleted successfully".into(),
            }))
        }
        DeleteOutcome::InUse => Err(ApiError::bad_request(
            "Cannot delete tag that is associated with blogs",
        )),
        DeleteOutcome::NotFound => Err(ApiError::not_found("Tag not found")),
    }
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|d| d.is_unique_violation())
}
