use sqlx::{PgPool, Row};

use super::RepoError;

/// Per-tenant credentials, maintained outside this service.
#[derive(Clone)]
pub struct AccountRecord {
    pub id: String,
    pub bluesky_identifier: String,
    pub bluesky_app_password: String,
    pub bluesky_service_url: String,
    pub shim_url: String,
    pub shim_secret: Option<String>,
}

impl std::fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRecord")
            .field("id", &self.id)
            .field("bluesky_identifier", &self.bluesky_identifier)
            .field("bluesky_service_url", &self.bluesky_service_url)
            .field("shim_url", &self.shim_url)
            .finish_non_exhaustive()
    }
}

pub async fn list_enabled_accounts(pool: &PgPool) -> Result<Vec<AccountRecord>, RepoError> {
    let rows = sqlx::query(
        r#"
        SELECT id,
               bluesky_identifier,
               bluesky_app_password,
               bluesky_service_url,
               shim_url,
               shim_secret
        FROM sync_accounts
        WHERE enabled
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    let mut accounts = Vec::with_capacity(rows.len());
    for row in rows {
        accounts.push(AccountRecord {
            id: row.try_get("id")?,
            bluesky_identifier: row.try_get("bluesky_identifier")?,
            bluesky_app_password: row.try_get("bluesky_app_password")?,
            bluesky_service_url: row.try_get("bluesky_service_url")?,
            shim_url: row.try_get("shim_url")?,
            shim_secret: row.try_get("shim_secret")?,
        });
    }
    Ok(accounts)
}
