use axum::{
    extract::{Query, State},
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{password::hash_password, AuthUser},
    blogs::dto::BlogItem,
    blogs::query::{BlogFilter, Pagination, Scope, Sort, SortField, SortOrder},
    blogs::repo as blog_repo,
    error::ApiError,
    policy::{self, authorize},
    state::AppState,
};

use super::dto::{
    MyBlogsQuery, PublicUser, UpdateProfileRequest, UserBlogListResponse, UserDeletedResponse,
    UserPageMeta,
};
use super::repo::{ProfileChanges, User};

const DEFAULT_PAGE_SIZE: i64 = 10;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/profile", get(get_profile))
        .route("/user/profile/blogs", get(list_my_blogs))
        .route("/user/profile/edit", patch(update_profile))
        .route("/user/profile/delete", delete(delete_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    authorize(policy::PROFILE, user.role)?;

    let profile = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(profile.into()))
}

#[instrument(skip(state))]
pub async fn list_my_blogs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<MyBlogsQuery>,
) -> Result<Json<UserBlogListResponse>, ApiError> {
    authorize(policy::PROFILE, user.role)?;

    let pagination =
        Pagination::normalize(q.page.as_deref(), q.page_size.as_deref(), DEFAULT_PAGE_SIZE);
    let sort = Sort {
        field: SortField::parse(q.sort_field.as_deref())?,
        order: SortOrder::parse(q.sort_order.as_deref())?,
    };
    let mut filter = BlogFilter::scoped(Scope::Author(user.id));
    filter.search = q.search.filter(|s| !s.is_empty());

    let (records, total_count) = blog_repo::list(&state.db, &filter, sort, pagination).await?;
    let data = records
        .into_iter()
        .map(|r| BlogItem::from_record(r, &state.config.public_base_url))
        .collect();

    Ok(Json(UserBlogListResponse {
        message: "User blogs fetched successfully".into(),
        data,
        meta: UserPageMeta::new(pagination, total_count),
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    authorize(policy::PROFILE, user.role)?;

    let password_hash = payload.password.as_deref().map(hash_password).transpose()?;
    let changes = ProfileChanges {
        name: payload.name,
        email: payload.email,
        username: payload.username,
        password_hash,
        role: payload.role,
    };

    let updated = match User::update_profile(&state.db, user.id, &changes).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            warn!(user_id = user.id, "profile update hits taken username/email");
            return Err(ApiError::bad_request("Username or email already taken"));
        }
        Err(e) => return Err(ApiError::Internal(e)),
    }
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(user_id = user.id, "profile updated");
    Ok(Json(updated.into()))
}

#[instrument(skip(state))]
pub async fn delete_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserDeletedResponse>, ApiError> {
    authorize(policy::PROFILE, user.role)?;

    if !User::delete(&state.db, user.id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = user.id, "user deleted");
    Ok(Json(UserDeletedResponse {
        message: "User deleted successfully".into(),
    }))
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|d| d.is_unique_violation())
}
