use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// At least one blog still references the tag.
    InUse,
    NotFound,
}

impl Tag {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY id")
            .fetch_all(db)
            .await?;
        Ok(tags)
    }

    pub async fn create(db: &PgPool, name: &str) -> anyhow::Result<Tag> {
        let tag = sqlx::query_as::<_, Tag>("INSERT INTO tags (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(db)
            .await?;
        Ok(tag)
    }

    pub async fn rename(db: &PgPool, id: i64, name: &str) -> anyhow::Result<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>(
            "UPDATE tags SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(db)
        .await?;
        Ok(tag)
    }

    /// Deletes the tag only while no blog references it. The guard and the
    /// delete are one statement, so two racing deletes cannot both succeed
    /// and a delete cannot slip past a concurrent association.
    pub async fn delete_if_unused(db: &PgPool, id: i64) -> anyhow::Result<DeleteOutcome> {
        let res = sqlx::query(
            r#"
            DELETE FROM tags
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM blog_tags WHERE tag_id = $1)
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;

        if res.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tags WHERE id = $1)")
            .bind(id)
            .fetch_one(db)
            .await?;
        if exists {
            Ok(DeleteOutcome::InUse)
        } else {
            Ok(DeleteOutcome::NotFound)
        }
    }
}
