use serde::{Deserialize, Serialize};

use crate::blogs::dto::{BlogItem, PageMeta};
use crate::blogs::query::Pagination;
use crate::policy::Role;

use super::repo::User;

/// Public part of a user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            name: u.name,
            role: u.role,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyBlogsQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// Listing meta extended with navigation hints; `nextPage`/`prevPage` are
/// null at the edges.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPageMeta {
    #[serde(flatten)]
    pub base: PageMeta,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub next_page: Option<i64>,
    pub prev_page: Option<i64>,
}

impl UserPageMeta {
    pub fn new(pagination: Pagination, total_count: i64) -> Self {
        let base = PageMeta::new(pagination, total_count);
        let has_next_page = base.page < base.total_pages;
        let has_previous_page = base.page > 1;
        Self {
            base,
            has_next_page,
            has_previous_page,
            next_page: has_next_page.then(|| base.page + 1),
            prev_page: has_previous_page.then(|| base.page - 1),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserBlogListResponse {
    pub message: String,
    pub data: Vec<BlogItem>,
    pub meta: UserPageMeta,
}

#[derive(Debug, Serialize)]
pub struct UserDeletedResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(page: i64, page_size: i64) -> Pagination {
        Pagination { page, page_size }
    }

    #[test]
    fn middle_page_has_both_neighbours() {
        let meta = UserPageMeta::new(pg(2, 10), 35);
        assert_eq!(meta.base.total_pages, 4);
        assert!(meta.has_next_page);
        assert!(meta.has_previous_page);
        assert_eq!(meta.next_page, Some(3));
        assert_eq!(meta.prev_page, Some(1));
    }

    #[test]
    fn edges_yield_null_navigation() {
        let first = UserPageMeta::new(pg(1, 10), 35);
        assert!(!first.has_previous_page);
        assert_eq!(first.prev_page, None);

        let last = UserPageMeta::new(pg(4, 10), 35);
        assert!(!last.has_next_page);
        assert_eq!(last.next_page, None);
    }

    #[test]
    fn empty_listing_has_no_navigation() {
        let meta = UserPageMeta::new(pg(1, 10), 0);
        assert_eq!(meta.base.total_pages, 0);
        assert!(!meta.has_next_page);
        assert!(!meta.has_previous_page);
    }

    #[test]
    fn navigation_serializes_as_null_not_absent() {
        let json = serde_json::to_value(UserPageMeta::new(pg(1, 10), 5)).unwrap();
        assert!(json["nextPage"].is_null());
        assert!(json["prevPage"].is_null());
        assert_eq!(json["hasNextPage"], false);
        assert_eq!(json["totalPages"], 1);
    }
}
