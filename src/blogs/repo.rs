use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;

use crate::error::ApiError;
use crate::tags::repo::Tag;

use super::query::{push_where, BlogFilter, Pagination, Sort};

/// Controls whether a blog appears in the shared listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "visibility", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Private,
}

impl std::str::FromStr for Visibility {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUBLIC" => Ok(Visibility::Public),
            "PRIVATE" => Ok(Visibility::Private),
            other => Err(ApiError::bad_request(format!(
                "Invalid visibility: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BlogRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub visibility: Visibility,
    pub category: String,
    pub author_id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub author_name: String,
    pub author_email: String,
}

#[derive(Debug, Clone)]
pub struct BlogWithTags {
    pub blog: BlogRow,
    pub tags: Vec<Tag>,
}

#[derive(Debug)]
pub struct NewBlog {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub visibility: Visibility,
    pub category: String,
    pub tag_ids: Vec<i64>,
}

/// Fields of a blog update; absent fields are left untouched. A supplied
/// tag set replaces the existing one wholesale.
#[derive(Debug, Default)]
pub struct BlogChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub visibility: Option<Visibility>,
    pub category: Option<String>,
    pub tag_ids: Option<Vec<i64>>,
}

/// Owner and image reference of a blog, for ownership checks and cleanup.
#[derive(Debug, FromRow)]
pub struct BlogMeta {
    pub id: i64,
    pub author_id: i64,
    pub image_url: Option<String>,
}

const SELECT_BLOG: &str = "SELECT b.id, b.title, b.content, b.image_url, b.visibility, \
     b.category, b.author_id, b.created_at, b.updated_at, \
     u.name AS author_name, u.email AS author_email \
     FROM blogs b JOIN users u ON u.id = b.author_id";

/// Rows and total count for one filter, fetched inside a single transaction
/// so the count cannot disagree with the returned page.
pub async fn list(
    db: &PgPool,
    filter: &BlogFilter,
    sort: Sort,
    pagination: Pagination,
) -> anyhow::Result<(Vec<BlogWithTags>, i64)> {
    let mut tx = db.begin().await.context("begin listing tx")?;

    let mut qb = QueryBuilder::<Postgres>::new(SELECT_BLOG);
    push_where(&mut qb, filter);
    qb.push(" ORDER BY b.");
    qb.push(sort.field.column());
    qb.push(" ");
    qb.push(sort.order.sql());
    qb.push(" LIMIT ");
    qb.push_bind(pagination.page_size);
    qb.push(" OFFSET ");
    qb.push_bind(pagination.offset());
    let rows: Vec<BlogRow> = qb.build_query_as().fetch_all(&mut *tx).await?;

    let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM blogs b");
    push_where(&mut count_qb, filter);
    let total_count: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;

    let ids: Vec<i64> = rows.iter().map(|b| b.id).collect();
    let mut tag_map = tags_for(&mut tx, &ids).await?;
    tx.commit().await?;

    let blogs = rows
        .into_iter()
        .map(|blog| {
            let tags = tag_map.remove(&blog.id).unwrap_or_default();
            BlogWithTags { blog, tags }
        })
        .collect();
    Ok((blogs, total_count))
}

pub async fn get_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<BlogWithTags>> {
    let mut tx = db.begin().await?;
    let blog = sqlx::query_as::<_, BlogRow>(&format!("{SELECT_BLOG} WHERE b.id = $1"))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(blog) = blog else {
        return Ok(None);
    };
    let mut tag_map = tags_for(&mut tx, &[blog.id]).await?;
    tx.commit().await?;
    let tags = tag_map.remove(&blog.id).unwrap_or_default();
    Ok(Some(BlogWithTags { blog, tags }))
}

pub async fn find_meta(db: &PgPool, id: i64) -> anyhow::Result<Option<BlogMeta>> {
    let meta =
        sqlx::query_as::<_, BlogMeta>("SELECT id, author_id, image_url FROM blogs WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(meta)
}

pub async fn create(db: &PgPool, author_id: i64, new: &NewBlog) -> anyhow::Result<BlogWithTags> {
    let mut tx = db.begin().await.context("begin create tx")?;

    let blog_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO blogs (title, content, image_url, visibility, category, author_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&new.title)
    .bind(&new.content)
    .bind(&new.image_url)
    .bind(new.visibility)
    .bind(&new.category)
    .bind(author_id)
    .fetch_one(&mut *tx)
    .await?;

    link_tags(&mut tx, blog_id, &new.tag_ids).await?;

    let blog = sqlx::query_as::<_, BlogRow>(&format!("{SELECT_BLOG} WHERE b.id = $1"))
        .bind(blog_id)
        .fetch_one(&mut *tx)
        .await?;
    let mut tag_map = tags_for(&mut tx, &[blog_id]).await?;
    tx.commit().await?;

    let tags = tag_map.remove(&blog_id).unwrap_or_default();
    Ok(BlogWithTags { blog, tags })
}

/// Returns false when the blog no longer exists.
pub async fn update(db: &PgPool, id: i64, changes: &BlogChanges) -> anyhow::Result<bool> {
    let mut tx = db.begin().await.context("begin update tx")?;

    let res = sqlx::query(
        r#"
        UPDATE blogs SET
            title = COALESCE($2, title),
            content = COALESCE($3, content),
            image_url = COALESCE($4, image_url),
            visibility = COALESCE($5, visibility),
            category = COALESCE($6, category),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&changes.title)
    .bind(&changes.content)
    .bind(&changes.image_url)
    .bind(changes.visibility)
    .bind(&changes.category)
    .execute(&mut *tx)
    .await?;

    if res.rows_affected() == 0 {
        return Ok(false);
    }

    if let Some(tag_ids) = &changes.tag_ids {
        sqlx::query("DELETE FROM blog_tags WHERE blog_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_tags(&mut tx, id, tag_ids).await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Returns false when the blog no longer exists.
pub async fn delete(db: &PgPool, id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM blogs WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

async fn link_tags(
    tx: &mut Transaction<'_, Postgres>,
    blog_id: i64,
    tag_ids: &[i64],
) -> anyhow::Result<()> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    // ON CONFLICT keeps the tag set free of duplicates.
    sqlx::query(
        r#"
        INSERT INTO blog_tags (blog_id, tag_id)
        SELECT $1, t FROM UNNEST($2::bigint[]) AS t
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(blog_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct BlogTagRow {
    blog_id: i64,
    id: i64,
    name: String,
}

async fn tags_for(
    tx: &mut Transaction<'_, Postgres>,
    blog_ids: &[i64],
) -> anyhow::Result<HashMap<i64, Vec<Tag>>> {
    if blog_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, BlogTagRow>(
        r#"
        SELECT bt.blog_id, t.id, t.name
        FROM blog_tags bt
        JOIN tags t ON t.id = bt.tag_id
        WHERE bt.blog_id = ANY($1)
        ORDER BY t.id
        "#,
    )
    .bind(blog_ids)
    .fetch_all(&mut **tx)
    .await?;

    let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in rows {
        map.entry(row.blog_id).or_default().push(Tag {
            id: row.id,
            name: row.name,
        });
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn visibility_parses_strictly() {
        assert_eq!(Visibility::from_str("PUBLIC").unwrap(), Visibility::Public);
        assert_eq!(
            Visibility::from_str("PRIVATE").unwrap(),
            Visibility::Private
        );
        assert!(Visibility::from_str("public").is_err());
        assert!(Visibility::from_str("HIDDEN").is_err());
    }

    #[test]
    fn visibility_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&Visibility::Public).unwrap(),
            "\"PUBLIC\""
        );
        let v: Visibility = serde_json::from_str("\"PRIVATE\"").unwrap();
        assert_eq!(v, Visibility::Private);
    }
}
