use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::at_uri::AtUri;

/// A published article known to the sync job.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub account_id: Option<String>,
    pub ghost_post_id: Option<String>,
    pub thread_uri: Option<AtUri>,
}

/// A post with both identifiers present.
#[derive(Debug, Clone, Serialize)]
pub struct EligiblePost {
    pub id: String,
    pub ghost_post_id: String,
    pub thread_uri: AtUri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    MissingGhostId,
    MissingThreadUri,
}

impl Post {
    pub fn eligible(&self) -> Result<EligiblePost, Ineligible> {
        let ghost_post_id = self
            .ghost_post_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(Ineligible::MissingGhostId)?;
        let thread_uri = self.thread_uri.clone().ok_or(Ineligible::MissingThreadUri)?;
        Ok(EligiblePost {
            id: self.id.clone(),
            ghost_post_id: ghost_post_id.to_string(),
            thread_uri,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorIdentity {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
}

/// A reply observed on the social network. Never persisted as-is.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyNode {
    pub uri: AtUri,
    pub cid: String,
    pub author: AuthorIdentity,
    pub text: String,
    /// Timestamp claimed by the posting client; not verified.
    pub created_at: DateTime<Utc>,
    pub parent_uri: Option<AtUri>,
}

/// Ledger entry: this reply was delivered as this comment.
#[derive(Debug, Clone, Serialize)]
pub struct CommentMapping {
    pub bluesky_uri: AtUri,
    pub ghost_comment_id: String,
    pub post_id: String,
    pub author_did: String,
    pub author_handle: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateCommentRequest {
    pub post_id: String,
    pub author_handle: String,
    pub author_profile_url: String,
    pub author_post_url: String,
    pub text: String,
    pub parent_comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub post_id: String,
    pub new_comments: usize,
    pub errors: Vec<String>,
}

impl SyncResult {
    pub fn new(post_id: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            ..Self::default()
        }
    }

    pub fn fatal(post_id: &str, error: impl Into<String>) -> Self {
        Self {
            post_id: post_id.to_string(),
            new_comments: 0,
            errors: vec![error.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedAccount {
    pub account_id: String,
    pub reason: String,
}

/// Outcome of one batch run across every account in scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<SyncResult>,
    pub skipped_accounts: Vec<SkippedAccount>,
}

impl SyncReport {
    pub fn posts_processed(&self) -> usize {
        self.results.len()
    }

    pub fn new_comments(&self) -> usize {
        self.results.iter().map(|result| result.new_comments).sum()
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().map(|result| result.errors.len()).sum()
    }
}
