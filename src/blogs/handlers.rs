use std::path::Path as FilePath;
use std::str::FromStr;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
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
    storage::{image_extension, stored_file_name, MAX_IMAGE_BYTES},
};

use super::dto::{
    BlogCreatedResponse, BlogDetailResponse, BlogItem, BlogListResponse, BlogMutationResponse,
    ListBlogsQuery, PageMeta,
};
use super::query::{parse_tag_ids, BlogFilter, Pagination, Scope, Sort};
use super::repo::{self, BlogChanges, NewBlog, Visibility};

const DEFAULT_PAGE_SIZE: i64 = 5;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/blog", get(list_blogs))
        .route("/blog/:id", get(get_blog))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/blog/create", post(create_blog))
        .route("/blog/:id/edit", patch(update_blog))
        .route("/blog/:id/delete", delete(delete_blog))
        // one image plus text fields; per-file size is checked separately
        .layer(DefaultBodyLimit::max(6 * 1024 * 1024))
}

#[instrument(skip(state))]
pub async fn list_blogs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<ListBlogsQuery>,
) -> Result<Json<BlogListResponse>, ApiError> {
    authorize(policy::BLOG_READ, user.role)?;

    let pagination = Pagination::normalize(q.page.as_deref(), q.page_size.as_deref(), DEFAULT_PAGE_SIZE);
    let mut filter = BlogFilter::scoped(Scope::for_shared_listing(user.role, user.id));
    filter.visibility = q
        .visibility
        .as_deref()
        .map(Visibility::from_str)
        .transpose()?;
    filter.category = q.category;
    filter.tag_ids = parse_tag_ids(q.tags.as_deref())?;

    let (records, total_count) =
        repo::list(&state.db, &filter, Sort::default(), pagination).await?;
    let data = records
        .into_iter()
        .map(|r| BlogItem::from_record(r, &state.config.public_base_url))
        .collect();

    Ok(Json(BlogListResponse {
        message: "Blogs fetched successfully".into(),
        data,
        meta: PageMeta::new(pagination, total_count),
    }))
}

#[instrument(skip(state))]
pub async fn get_blog(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BlogDetailResponse>, ApiError> {
    authorize(policy::BLOG_READ, user.role)?;

    let record = repo::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Blog not found"))?;

    Ok(Json(BlogDetailResponse {
        message: "Blog fetched successfully".into(),
        data: BlogItem::from_record(record, &state.config.public_base_url),
    }))
}

#[instrument(skip(state, mp))]
pub async fn create_blog(
    State(state): State<AppState>,
    user: AuthUser,
    mp: Multipart,
) -> Result<(StatusCode, Json<BlogCreatedResponse>), ApiError> {
    authorize(policy::BLOG_CREATE, user.role)?;

    let form = read_blog_form(&state, mp).await?;
    let upload = form.image_path.clone();
    let result = persist_new_blog(&state, user.id, form).await;
    let record = discard_upload_on_error(&state, upload.as_deref(), result).await?;

    info!(blog_id = record.blog.id, author_id = user.id, "blog created");
    Ok((
        StatusCode::CREATED,
        Json(BlogCreatedResponse {
            message: "Blog created successfully".into(),
            data: BlogItem::from_record(record, &state.config.public_base_url),
        }),
    ))
}

#[instrument(skip(state, mp))]
pub async fn update_blog(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    mp: Multipart,
) -> Result<Json<BlogMutationResponse>, ApiError> {
    authorize(policy::BLOG_MUTATE, user.role)?;

    let meta = repo::find_meta(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Blog not found"))?;
    ensure_blog_author(&meta, user.id)?;

    let form = read_blog_form(&state, mp).await?;
    let new_image = form.image_path.clone();
    let changes = BlogChanges {
        title: form.title,
        content: form.content,
        image_url: form.image_path,
        visibility: form.visibility,
        category: form.category,
        tag_ids: form.tag_ids,
    };

    let result = apply_blog_changes(&state, id, &changes).await;
    discard_upload_on_error(&state, new_image.as_deref(), result).await?;

    if new_image.is_some() {
        remove_stored_image(&state, meta.image_url.as_deref()).await;
    }

    info!(blog_id = id, author_id = user.id, "blog updated");
    Ok(Json(BlogMutationResponse {
        id,
        message: "Blog updated successfully".into(),
    }))
}

#[instrument(skip(state))]
pub async fn delete_blog(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BlogMutationResponse>, ApiError> {
    authorize(policy::BLOG_MUTATE, user.role)?;

    let meta = repo::find_meta(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Blog not found"))?;

    if !repo::delete(&state.db, meta.id).await? {
        return Err(ApiError::not_found("Blog not found"));
    }
    remove_stored_image(&state, meta.image_url.as_deref()).await;

    info!(blog_id = id, caller_id = user.id, "blog deleted");
    Ok(Json(BlogMutationResponse {
        id,
        message: "Blog deleted successfully".into(),
    }))
}

/// Editing is reserved for the owning author; deletion stays open to any
/// caller who passed the route's role gate.
fn ensure_blog_author(meta: &repo::BlogMeta, caller_id: i64) -> Result<(), ApiError> {
    if meta.author_id != caller_id {
        return Err(ApiError::Forbidden("Access Denied".into()));
    }
    Ok(())
}

async fn persist_new_blog(
    state: &AppState,
    author_id: i64,
    form: BlogForm,
) -> Result<repo::BlogWithTags, ApiError> {
    let new = NewBlog {
        title: require_field(form.title, "title")?,
        content: require_field(form.content, "content")?,
        image_url: form.image_path,
        visibility: form
            .visibility
            .ok_or_else(|| ApiError::bad_request("visibility is required"))?,
        category: require_field(form.category, "category")?,
        tag_ids: form.tag_ids.unwrap_or_default(),
    };

    match repo::create(&state.db, author_id, &new).await {
        Ok(r) => Ok(r),
        Err(e) if is_foreign_key_violation(&e) => {
            warn!("create blog references unknown tag");
            Err(ApiError::bad_request("Unknown tag id"))
        }
        Err(e) => Err(ApiError::Internal(e)),
    }
}

async fn apply_blog_changes(state: &AppState, id: i64, changes: &BlogChanges) -> Result<(), ApiError> {
    let updated = match repo::update(&state.db, id, changes).await {
        Ok(v) => v,
        Err(e) if is_foreign_key_violation(&e) => {
            return Err(ApiError::bad_request("Unknown tag id"));
        }
        Err(e) => return Err(ApiError::Internal(e)),
    };
    if !updated {
        return Err(ApiError::not_found("Blog not found"));
    }
    Ok(())
}

/// A freshly stored upload must not outlive a failed request; remove it
/// before surfacing the error.
async fn discard_upload_on_error<T>(
    state: &AppState,
    upload: Option<&str>,
    result: Result<T, ApiError>,
) -> Result<T, ApiError> {
    if result.is_err() {
        remove_stored_image(state, upload).await;
    }
    result
}

#[derive(Debug, Default)]
struct BlogForm {
    title: Option<String>,
    content: Option<String>,
    visibility: Option<Visibility>,
    category: Option<String>,
    tag_ids: Option<Vec<i64>>,
    image_path: Option<String>,
}

/// Reads the multipart body of a blog create/edit request. The image is
/// validated and stored before any database work happens.
async fn read_blog_form(state: &AppState, mut mp: Multipart) -> Result<BlogForm, ApiError> {
    let mut form = BlogForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue;
        };
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let ext = image_extension(&file_name)?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read image: {e}")))?;
                if data.len() > MAX_IMAGE_BYTES {
                    return Err(ApiError::bad_request("Image exceeds the 5 MiB limit"));
                }
                let stored = stored_file_name("image", &ext);
                form.image_path = Some(state.storage.put_object(&stored, data).await?);
            }
            "title" => form.title = Some(field_text(field).await?),
            "content" => form.content = Some(field_text(field).await?),
            "visibility" => {
                form.visibility = Some(Visibility::from_str(&field_text(field).await?)?)
            }
            "category" => form.category = Some(field_text(field).await?),
            "tags" => form.tag_ids = parse_tag_ids(Some(&field_text(field).await?))?,
            _ => {}
        }
    }
    Ok(form)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart field: {e}")))
}

fn require_field(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

/// Image files are cleaned up best-effort; a leftover file never fails the
/// request.
async fn remove_stored_image(state: &AppState, stored_path: Option<&str>) {
    let Some(path) = stored_path else { return };
    let Some(name) = FilePath::new(path).file_name().and_then(|n| n.to_str()) else {
        return;
    };
    if let Err(e) = state.storage.delete_object(name).await {
        warn!(error = %e, file = name, "failed to remove stored image");
    }
}

fn is_foreign_key_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|d| d.is_foreign_key_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Role;
    use crate::storage::StorageClient;
    use axum::async_trait;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingStorage {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageClient for RecordingStorage {
        async fn put_object(&self, name: &str, _b: Bytes) -> anyhow::Result<String> {
            Ok(format!("images/{name}"))
        }
        async fn delete_object(&self, name: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    fn recording_state() -> (AppState, Arc<RecordingStorage>) {
        let base = AppState::fake();
        let storage = Arc::new(RecordingStorage::default());
        let state = AppState::from_parts(base.db.clone(), base.config.clone(), storage.clone());
        (state, storage)
    }

    #[tokio::test]
    async fn failed_request_discards_its_stored_upload() {
        let (state, storage) = recording_state();
        let result: Result<(), ApiError> = Err(ApiError::bad_request("title is required"));
        let out = discard_upload_on_error(&state, Some("images/image_9.png"), result).await;
        assert!(out.is_err());
        assert_eq!(
            *storage.deleted.lock().unwrap(),
            vec!["image_9.png".to_string()]
        );
    }

    #[tokio::test]
    async fn successful_request_keeps_its_stored_upload() {
        let (state, storage) = recording_state();
        let out = discard_upload_on_error(&state, Some("images/image_9.png"), Ok(7)).await;
        assert_eq!(out.unwrap(), 7);
        assert!(storage.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_with_missing_title_fails_before_any_insert() {
        let (state, _storage) = recording_state();
        let form = BlogForm {
            image_path: Some("images/image_9.png".into()),
            ..BlogForm::default()
        };
        // require_field trips before the database is touched
        let err = persist_new_blog(&state, 1, form).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn editing_is_reserved_for_the_owning_author() {
        let meta = repo::BlogMeta {
            id: 3,
            author_id: 7,
            image_url: None,
        };
        assert!(ensure_blog_author(&meta, 7).is_ok());
        let err = ensure_blog_author(&meta, 8).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn require_field_rejects_missing_and_blank() {
        assert!(require_field(None, "title").is_err());
        assert!(require_field(Some("   ".into()), "title").is_err());
        assert_eq!(require_field(Some("Hello".into()), "title").unwrap(), "Hello");
    }

    #[test]
    fn shared_listing_scope_depends_on_role() {
        assert_eq!(Scope::for_shared_listing(Role::Admin, 1), Scope::All);
        assert_eq!(
            Scope::for_shared_listing(Role::User, 9),
            Scope::PublicOrOwn(9)
        );
    }
}
