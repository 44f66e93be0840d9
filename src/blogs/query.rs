use sqlx::{Postgres, QueryBuilder};

use crate::error::ApiError;
use crate::policy::Role;

use super::repo::Visibility;

pub const MAX_PAGE_SIZE: i64 = 100;

/// Normalized pagination: `page >= 1`, `1 <= page_size <= MAX_PAGE_SIZE`.
/// Absent or non-numeric values fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn normalize(page: Option<&str>, page_size: Option<&str>, default_size: i64) -> Self {
        let page = page
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1);
        let page_size = page_size
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|s| *s >= 1)
            .unwrap_or(default_size)
            .min(MAX_PAGE_SIZE);
        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        // page is client-supplied and only bounded below; keep the math
        // from overflowing for absurd page numbers.
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Base scope of a blog listing. Client filters AND onto this and can only
/// narrow it, never widen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// ADMIN on the shared listing sees everything.
    All,
    /// USER on the shared listing sees public blogs plus their own.
    PublicOrOwn(i64),
    /// The "my blogs" listing is pinned to the caller.
    Author(i64),
}

impl Scope {
    pub fn for_shared_listing(role: Role, caller_id: i64) -> Scope {
        match role {
            Role::Admin => Scope::All,
            Role::User => Scope::PublicOrOwn(caller_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlogFilter {
    pub scope: Scope,
    pub visibility: Option<Visibility>,
    pub category: Option<String>,
    pub tag_ids: Option<Vec<i64>>,
    pub search: Option<String>,
}

impl BlogFilter {
    pub fn scoped(scope: Scope) -> Self {
        Self {
            scope,
            visibility: None,
            category: None,
            tag_ids: None,
            search: None,
        }
    }
}

/// Comma-separated tag ids from the `tags` query parameter.
pub fn parse_tag_ids(raw: Option<&str>) -> Result<Option<Vec<i64>>, ApiError> {
    let Some(raw) = raw else { return Ok(None) };
    let ids = raw
        .split(',')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<Vec<i64>, _>>()
        .map_err(|_| ApiError::bad_request(format!("Invalid tags filter: {raw}")))?;
    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(ids))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Title,
    Category,
}

impl SortField {
    /// Allow-listed mapping from query names to real sortable columns.
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw {
            None | Some("createdAt") => Ok(Self::CreatedAt),
            Some("updatedAt") => Ok(Self::UpdatedAt),
            Some("title") => Ok(Self::Title),
            Some("category") => Ok(Self::Category),
            Some(other) => Err(ApiError::bad_request(format!(
                "Invalid sortField: {other}"
            ))),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Title => "title",
            Self::Category => "category",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw {
            None | Some("desc") => Ok(Self::Desc),
            Some("asc") => Ok(Self::Asc),
            Some(other) => Err(ApiError::bad_request(format!(
                "Invalid sortOrder: {other}"
            ))),
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

/// Appends the WHERE clause for `filter` to `qb`. Used for both the row
/// query and the count query so they always agree.
pub fn push_where(qb: &mut QueryBuilder<Postgres>, filter: &BlogFilter) {
    qb.push(" WHERE 1=1");
    match filter.scope {
        Scope::All => {}
        Scope::PublicOrOwn(caller_id) => {
            qb.push(" AND (b.visibility = ");
            qb.push_bind(Visibility::Public);
            qb.push(" OR b.author_id = ");
            qb.push_bind(caller_id);
            qb.push(")");
        }
        Scope::Author(caller_id) => {
            qb.push(" AND b.author_id = ");
            qb.push_bind(caller_id);
        }
    }
    if let Some(visibility) = filter.visibility {
        qb.push(" AND b.visibility = ");
        qb.push_bind(visibility);
    }
    if let Some(category) = &filter.category {
        qb.push(" AND b.category = ");
        qb.push_bind(category.clone());
    }
    if let Some(tag_ids) = &filter.tag_ids {
        // "contains any of", not "contains all of"
        qb.push(" AND EXISTS (SELECT 1 FROM blog_tags bt WHERE bt.blog_id = b.id AND bt.tag_id = ANY(");
        qb.push_bind(tag_ids.clone());
        qb.push("))");
    }
    if let Some(search) = &filter.search {
        qb.push(" AND b.title LIKE ");
        qb.push_bind(format!("%{}%", escape_like(search)));
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(filter: &BlogFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT b.id FROM blogs b");
        push_where(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn pagination_defaults_on_absent_or_garbage() {
        assert_eq!(
            Pagination::normalize(None, None, 5),
            Pagination { page: 1, page_size: 5 }
        );
        assert_eq!(
            Pagination::normalize(Some("abc"), Some("xyz"), 10),
            Pagination { page: 1, page_size: 10 }
        );
        assert_eq!(
            Pagination::normalize(Some("0"), Some("-3"), 10),
            Pagination { page: 1, page_size: 10 }
        );
    }

    #[test]
    fn pagination_accepts_valid_values_and_caps_size() {
        let p = Pagination::normalize(Some("3"), Some("25"), 5);
        assert_eq!(p, Pagination { page: 3, page_size: 25 });
        assert_eq!(p.offset(), 50);

        let capped = Pagination::normalize(None, Some("100000"), 5);
        assert_eq!(capped.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn offset_saturates_for_huge_page_numbers() {
        let p = Pagination::normalize(Some("9223372036854775807"), Some("100"), 5);
        assert_eq!(p.page, i64::MAX);
        assert_eq!(p.offset(), i64::MAX);

        let near_max = Pagination {
            page: i64::MAX / 2,
            page_size: 100,
        };
        assert!(near_max.offset() >= 0);
    }

    #[test]
    fn tag_ids_parse_or_reject() {
        assert_eq!(parse_tag_ids(None).unwrap(), None);
        assert_eq!(
            parse_tag_ids(Some("1,2, 3")).unwrap(),
            Some(vec![1, 2, 3])
        );
        assert!(parse_tag_ids(Some("1,foo")).is_err());
        assert!(parse_tag_ids(Some("1;2")).is_err());
    }

    #[test]
    fn sort_field_allow_list() {
        assert_eq!(SortField::parse(None).unwrap(), SortField::CreatedAt);
        assert_eq!(
            SortField::parse(Some("updatedAt")).unwrap().column(),
            "updated_at"
        );
        assert_eq!(SortField::parse(Some("title")).unwrap().column(), "title");
        assert!(SortField::parse(Some("password")).is_err());
        assert!(SortField::parse(Some("created_at; DROP TABLE blogs")).is_err());
    }

    #[test]
    fn sort_order_parse() {
        assert_eq!(SortOrder::parse(None).unwrap(), SortOrder::Desc);
        assert_eq!(SortOrder::parse(Some("asc")).unwrap(), SortOrder::Asc);
        assert!(SortOrder::parse(Some("sideways")).is_err());
    }

    #[test]
    fn author_scope_is_always_present() {
        let filter = BlogFilter::scoped(Scope::Author(7));
        let sql = sql_for(&filter);
        assert!(sql.contains("b.author_id = $1"));
    }

    #[test]
    fn user_scope_cannot_be_bypassed_by_filters() {
        let mut filter = BlogFilter::scoped(Scope::PublicOrOwn(7));
        filter.visibility = Some(Visibility::Private);
        let sql = sql_for(&filter);
        // Base scope stays in place; the client filter only narrows it.
        assert!(sql.contains("(b.visibility = $1 OR b.author_id = $2)"));
        assert!(sql.contains("AND b.visibility = $3"));
    }

    #[test]
    fn filters_compose_with_and() {
        let mut filter = BlogFilter::scoped(Scope::All);
        filter.visibility = Some(Visibility::Public);
        filter.category = Some("tech".into());
        filter.tag_ids = Some(vec![1, 2]);
        let sql = sql_for(&filter);
        assert!(sql.contains("AND b.visibility = $1"));
        assert!(sql.contains("AND b.category = $2"));
        assert!(sql.contains("bt.tag_id = ANY($3)"));
    }

    #[test]
    fn search_pattern_is_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
    }
}
