use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::public_image_url;
use crate::tags::repo::Tag;

use super::query::Pagination;
use super::repo::{BlogWithTags, Visibility};

/// Raw query parameters of the shared listing. Pagination values arrive as
/// strings so that non-numeric input falls back to defaults instead of
/// failing extraction.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBlogsQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub visibility: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorInfo {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogItem {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub visibility: Visibility,
    pub category: String,
    pub author_id: i64,
    pub author: AuthorInfo,
    pub tags: Vec<Tag>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl BlogItem {
    /// Shapes a stored record for the wire, rewriting the stored image path
    /// into a URL under the public upload route (base name only).
    pub fn from_record(record: BlogWithTags, base_url: &str) -> Self {
        let blog = record.blog;
        Self {
            id: blog.id,
            title: blog.title,
            content: blog.content,
            image_url: blog
                .image_url
                .as_deref()
                .and_then(|path| public_image_url(base_url, path)),
            visibility: blog.visibility,
            category: blog.category,
            author_id: blog.author_id,
            author: AuthorInfo {
                name: blog.author_name,
                email: blog.author_email,
            },
            tags: record.tags,
            created_at: blog.created_at,
            updated_at: blog.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(pagination: Pagination, total_count: i64) -> Self {
        Self {
            page: pagination.page,
            page_size: pagination.page_size,
            total_count,
            total_pages: (total_count + pagination.page_size - 1) / pagination.page_size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlogListResponse {
    pub message: String,
    pub data: Vec<BlogItem>,
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct BlogDetailResponse {
    pub message: String,
    pub data: BlogItem,
}

#[derive(Debug, Serialize)]
pub struct BlogCreatedResponse {
    pub message: String,
    pub data: BlogItem,
}

/// Update and delete acknowledge with the affected id only.
#[derive(Debug, Serialize)]
pub struct BlogMutationResponse {
    pub id: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(page: i64, page_size: i64) -> Pagination {
        Pagination { page, page_size }
    }

    #[test]
    fn total_pages_is_ceiling() {
        assert_eq!(PageMeta::new(pg(1, 5), 0).total_pages, 0);
        assert_eq!(PageMeta::new(pg(1, 5), 1).total_pages, 1);
        assert_eq!(PageMeta::new(pg(1, 5), 5).total_pages, 1);
        assert_eq!(PageMeta::new(pg(1, 5), 6).total_pages, 2);
        assert_eq!(PageMeta::new(pg(1, 10), 101).total_pages, 11);
    }

    #[test]
    fn meta_serializes_camel_case() {
        let json = serde_json::to_value(PageMeta::new(pg(2, 5), 12)).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["pageSize"], 5);
        assert_eq!(json["totalCount"], 12);
        assert_eq!(json["totalPages"], 3);
    }
}
