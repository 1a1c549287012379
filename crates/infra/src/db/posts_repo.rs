use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;

use super::RepoError;
use ghostsky_core::domain::comments::Post;
use ghostsky_core::types::at_uri::AtUri;

/// A `posts` row before its thread URI is parsed.
#[derive(Debug, Clone)]
struct PostRow {
    id: String,
    account_id: Option<String>,
    ghost_post_id: Option<String>,
    bluesky_uri: Option<String>,
}

impl PostRow {
    fn from_row(row: &PgRow) -> Result<Self, RepoError> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            ghost_post_id: row.try_get("ghost_post_id")?,
            bluesky_uri: row.try_get("bluesky_uri")?,
        })
    }

    fn into_post(self) -> Result<Post, RepoError> {
        let thread_uri = self
            .bluesky_uri
            .map(|value| {
                AtUri::try_from(value.as_str()).map_err(|_| RepoError::InvalidValue {
                    column: "posts.bluesky_uri",
                    value,
                })
            })
            .transpose()?;
        Ok(Post {
            id: self.id,
            account_id: self.account_id,
            ghost_post_id: self.ghost_post_id,
            thread_uri,
        })
    }
}

pub async fn find_post(pool: &PgPool, post_id: &str) -> Result<Option<Post>, RepoError> {
    let row = sqlx::query(
        r#"
        SELECT id, account_id, ghost_post_id, bluesky_uri
        FROM posts
        WHERE id = $1
        "#,
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref()
        .map(PostRow::from_row)
        .transpose()?
        .map(PostRow::into_post)
        .transpose()
}

/// Posts ready for reconciliation, oldest first. `account_id = None` means
/// every account. Rows whose stored thread URI does not parse are logged and
/// left out so the rest of the account still syncs.
pub async fn list_syncable_posts(
    pool: &PgPool,
    account_id: Option<&str>,
) -> Result<Vec<Post>, RepoError> {
    let rows = sqlx::query(
        r#"
        SELECT id, account_id, ghost_post_id, bluesky_uri
        FROM posts
        WHERE ghost_post_id IS NOT NULL
          AND ghost_post_id <> ''
          AND bluesky_uri IS NOT NULL
          AND ($1::TEXT IS NULL OR account_id = $1)
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    let rows = rows
        .iter()
        .map(PostRow::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keep_convertible(rows))
}

fn keep_convertible(rows: Vec<PostRow>) -> Vec<Post> {
    rows.into_iter()
        .filter_map(|row| {
            let post_id = row.id.clone();
            match row.into_post() {
                Ok(post) => Some(post),
                Err(err) => {
                    warn!(post_id = %post_id, error = %err, "skipping post with unreadable thread uri");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{PostRow, keep_convertible};

    fn row(id: &str, uri: &str) -> PostRow {
        PostRow {
            id: id.to_string(),
            account_id: Some("acct".to_string()),
            ghost_post_id: Some(format!("ghost-{id}")),
            bluesky_uri: Some(uri.to_string()),
        }
    }

    #[test]
    fn malformed_thread_uri_skips_only_that_post() {
        let posts = keep_convertible(vec![
            row("p1", "at://did:plc:me/app.bsky.feed.post/one"),
            row("p2", "https://bsky.app/profile/me/post/two"),
            row("p3", "at://did:plc:me/app.bsky.feed.post/three"),
        ]);
        let ids: Vec<&str> = posts.iter().map(|post| post.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(
            posts[1].thread_uri.as_ref().map(|uri| uri.as_str()),
            Some("at://did:plc:me/app.bsky.feed.post/three")
        );
    }

    #[test]
    fn malformed_thread_uri_is_an_error_for_a_single_lookup() {
        let err = row("p2", "not a uri").into_post().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid stored value in posts.bluesky_uri: not a uri"
        );
    }
}
