//! Boundaries the reconciliation engine talks through.
//!
//! Implementations live in `ghostsky-infra`; tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::domain::comments::{CommentMapping, CreateCommentRequest, Post, ReplyNode};
use crate::error::PortError;
use crate::types::at_uri::AtUri;

#[async_trait]
pub trait ThreadSource: Send + Sync {
    /// Called once per account before its posts are processed, with every
    /// tracked thread root. Fails when the account cannot authenticate.
    async fn prepare(&self, _roots: &[AtUri]) -> Result<(), PortError> {
        Ok(())
    }

    /// Flattened, de-duplicated replies under `root`, in no particular order.
    async fn fetch_replies(&self, root: &AtUri) -> Result<Vec<ReplyNode>, PortError>;
}

#[async_trait]
pub trait CommentAdapter: Send + Sync {
    /// Never errors; any failure reads as unhealthy.
    async fn health_check(&self) -> bool;

    /// Returns the content platform's id for the created comment.
    async fn create_comment(&self, request: &CreateCommentRequest) -> Result<String, PortError>;
}

#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn mappings_for_post(&self, post_id: &str) -> Result<Vec<CommentMapping>, PortError>;

    /// Inserts the mapping unless one already exists for its URI. Returns
    /// `false` when the URI was already recorded.
    async fn record_mapping(&self, mapping: &CommentMapping) -> Result<bool, PortError>;

    /// The mapping recorded for a reply URI, whichever post it belongs to.
    async fn find_mapping(&self, bluesky_uri: &AtUri) -> Result<Option<CommentMapping>, PortError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn find_post(&self, post_id: &str) -> Result<Option<Post>, PortError>;

    /// Posts carrying both a content platform id and a thread root, optionally
    /// restricted to one account.
    async fn list_syncable_posts(&self, account_id: Option<&str>) -> Result<Vec<Post>, PortError>;
}
