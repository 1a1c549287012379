use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::RepoError;
use ghostsky_core::domain::comments::CommentMapping;
use ghostsky_core::types::at_uri::AtUri;

#[derive(Debug, Clone)]
pub struct MappingsOverview {
    pub syncable_posts: i64,
    pub mappings: i64,
    pub last_recorded_at: Option<DateTime<Utc>>,
}

/// Appends a mapping. The primary key on `bluesky_uri` makes a second insert
/// for the same reply a no-op; the return value says whether a row was added.
pub async fn insert_mapping(pool: &PgPool, mapping: &CommentMapping) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"
        INSERT INTO comment_mappings (
            bluesky_uri,
            ghost_comment_id,
            post_id,
            author_did,
            author_handle,
            recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (bluesky_uri) DO NOTHING
        "#,
    )
    .bind(mapping.bluesky_uri.as_str())
    .bind(&mapping.ghost_comment_id)
    .bind(&mapping.post_id)
    .bind(&mapping.author_did)
    .bind(&mapping.author_handle)
    .bind(mapping.recorded_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_mappings_for_post(
    pool: &PgPool,
    post_id: &str,
) -> Result<Vec<CommentMapping>, RepoError> {
    let rows = sqlx::query(
        r#"
        SELECT bluesky_uri,
               ghost_comment_id,
               post_id,
               author_did,
               author_handle,
               recorded_at
        FROM comment_mappings
        WHERE post_id = $1
        ORDER BY recorded_at ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(map_mapping).collect()
}

pub async fn find_mapping(
    pool: &PgPool,
    bluesky_uri: &AtUri,
) -> Result<Option<CommentMapping>, RepoError> {
    let row = sqlx::query(
        r#"
        SELECT bluesky_uri,
               ghost_comment_id,
               post_id,
               author_did,
               author_handle,
               recorded_at
        FROM comment_mappings
        WHERE bluesky_uri = $1
        "#,
    )
    .bind(bluesky_uri.as_str())
    .fetch_optional(pool)
    .await?;
    row.map(map_mapping).transpose()
}

fn map_mapping(row: PgRow) -> Result<CommentMapping, RepoError> {
    let uri: String = row.try_get("bluesky_uri")?;
    let bluesky_uri = AtUri::try_from(uri.as_str()).map_err(|_| RepoError::InvalidValue {
        column: "comment_mappings.bluesky_uri",
        value: uri.clone(),
    })?;
    Ok(CommentMapping {
        bluesky_uri,
        ghost_comment_id: row.try_get("ghost_comment_id")?,
        post_id: row.try_get("post_id")?,
        author_did: row.try_get("author_did")?,
        author_handle: row.try_get("author_handle")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

pub async fn fetch_mappings_overview(pool: &PgPool) -> Result<MappingsOverview, RepoError> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM posts
              WHERE ghost_post_id IS NOT NULL AND ghost_post_id <> '' AND bluesky_uri IS NOT NULL)
                AS syncable_posts,
            (SELECT COUNT(*) FROM comment_mappings) AS mappings,
            (SELECT MAX(recorded_at) FROM comment_mappings) AS last_recorded_at
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(MappingsOverview {
        syncable_posts: row.try_get("syncable_posts")?,
        mappings: row.try_get("mappings")?,
        last_recorded_at: row.try_get("last_recorded_at")?,
    })
}
