use async_trait::async_trait;

use super::{
    DbPool, RepoError, find_mapping, find_post, insert_mapping, list_mappings_for_post,
    list_syncable_posts,
};
use ghostsky_core::domain::comments::{CommentMapping, Post};
use ghostsky_core::error::PortError;
use ghostsky_core::ports::{MappingStore, PostStore};
use ghostsky_core::types::at_uri::AtUri;

/// Postgres-backed post and mapping store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl From<RepoError> for PortError {
    fn from(err: RepoError) -> Self {
        PortError::Storage(err.to_string())
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn find_post(&self, post_id: &str) -> Result<Option<Post>, PortError> {
        Ok(find_post(&self.pool, post_id).await?)
    }

    async fn list_syncable_posts(&self, account_id: Option<&str>) -> Result<Vec<Post>, PortError> {
        Ok(list_syncable_posts(&self.pool, account_id).await?)
    }
}

#[async_trait]
impl MappingStore for PgStore {
    async fn mappings_for_post(&self, post_id: &str) -> Result<Vec<CommentMapping>, PortError> {
        Ok(list_mappings_for_post(&self.pool, post_id).await?)
    }

    async fn record_mapping(&self, mapping: &CommentMapping) -> Result<bool, PortError> {
        Ok(insert_mapping(&self.pool, mapping).await?)
    }

    async fn find_mapping(&self, bluesky_uri: &AtUri) -> Result<Option<CommentMapping>, PortError> {
        Ok(find_mapping(&self.pool, bluesky_uri).await?)
    }
}
