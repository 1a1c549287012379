//! In-memory stand-ins for the engine's ports.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use ghostsky_core::domain::comments::{
    AuthorIdentity, CommentMapping, CreateCommentRequest, Post, ReplyNode,
};
use ghostsky_core::error::PortError;
use ghostsky_core::ports::{CommentAdapter, MappingStore, PostStore, ThreadSource};
use ghostsky_core::types::at_uri::AtUri;

pub const ROOT: &str = "at://did:plc:me/app.bsky.feed.post/root";

pub fn at(rkey: &str) -> String {
    format!("at://did:plc:{rkey}/app.bsky.feed.post/{rkey}")
}

fn uri(raw: &str) -> AtUri {
    AtUri::try_from(raw).unwrap()
}

/// Reply whose text is its rkey, stamped `offset` seconds after a fixed epoch.
pub fn reply(rkey: &str, offset: i64, parent: Option<&str>) -> ReplyNode {
    ReplyNode {
        uri: uri(&at(rkey)),
        cid: format!("cid-{rkey}"),
        author: AuthorIdentity {
            did: format!("did:plc:{rkey}"),
            handle: format!("user-{rkey}.test"),
            display_name: None,
        },
        text: rkey.to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap(),
        parent_uri: parent.map(uri),
    }
}

pub fn post(id: &str, ghost: Option<&str>, thread: Option<&str>) -> Post {
    Post {
        id: id.to_string(),
        account_id: None,
        ghost_post_id: ghost.map(str::to_string),
        thread_uri: thread.map(uri),
    }
}

pub fn mapping(rkey: &str, comment_id: &str, post_id: &str) -> CommentMapping {
    CommentMapping {
        bluesky_uri: uri(&at(rkey)),
        ghost_comment_id: comment_id.to_string(),
        post_id: post_id.to_string(),
        author_did: format!("did:plc:{rkey}"),
        author_handle: format!("user-{rkey}.test"),
        recorded_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct FakeStore {
    posts: Vec<Post>,
    mappings: Mutex<Vec<CommentMapping>>,
    rejected_writes: HashSet<String>,
    racing: Vec<CommentMapping>,
    fail_mapping_reads: bool,
    fail_post_listing: bool,
}

impl FakeStore {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts,
            ..Self::default()
        }
    }

    pub fn with_mappings(self, mappings: Vec<CommentMapping>) -> Self {
        *self.mappings.lock().unwrap() = mappings;
        self
    }

    pub fn rejecting_writes_for(mut self, bluesky_uri: &str) -> Self {
        self.rejected_writes.insert(bluesky_uri.to_string());
        self
    }

    /// Another writer records `mapping` just before this store's caller does.
    pub fn racing_with(mut self, mapping: CommentMapping) -> Self {
        self.racing.push(mapping);
        self
    }

    pub fn failing_mapping_reads(mut self) -> Self {
        self.fail_mapping_reads = true;
        self
    }

    pub fn failing_post_listing(mut self) -> Self {
        self.fail_post_listing = true;
        self
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }

    pub fn has_mapping(&self, bluesky_uri: &str) -> bool {
        self.mappings
            .lock()
            .unwrap()
            .iter()
            .any(|mapping| mapping.bluesky_uri.as_str() == bluesky_uri)
    }
}

#[async_trait]
impl PostStore for FakeStore {
    async fn find_post(&self, post_id: &str) -> Result<Option<Post>, PortError> {
        Ok(self.posts.iter().find(|post| post.id == post_id).cloned())
    }

    async fn list_syncable_posts(&self, account_id: Option<&str>) -> Result<Vec<Post>, PortError> {
        if self.fail_post_listing {
            return Err(PortError::Storage("listing unavailable".to_string()));
        }
        Ok(self
            .posts
            .iter()
            .filter(|post| post.eligible().is_ok())
            .filter(|post| account_id.is_none() || post.account_id.as_deref() == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MappingStore for FakeStore {
    async fn mappings_for_post(&self, post_id: &str) -> Result<Vec<CommentMapping>, PortError> {
        if self.fail_mapping_reads {
            return Err(PortError::Storage("mappings unavailable".to_string()));
        }
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .filter(|mapping| mapping.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn record_mapping(&self, mapping: &CommentMapping) -> Result<bool, PortError> {
        if self.rejected_writes.contains(mapping.bluesky_uri.as_str()) {
            return Err(PortError::Storage("write refused".to_string()));
        }
        let mut mappings = self.mappings.lock().unwrap();
        if let Some(winner) = self
            .racing
            .iter()
            .find(|racing| racing.bluesky_uri == mapping.bluesky_uri)
        {
            if !mappings.iter().any(|existing| existing.bluesky_uri == winner.bluesky_uri) {
                mappings.push(winner.clone());
            }
        }
        if mappings
            .iter()
            .any(|existing| existing.bluesky_uri == mapping.bluesky_uri)
        {
            return Ok(false);
        }
        mappings.push(mapping.clone());
        Ok(true)
    }

    async fn find_mapping(&self, bluesky_uri: &AtUri) -> Result<Option<CommentMapping>, PortError> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .find(|mapping| &mapping.bluesky_uri == bluesky_uri)
            .cloned())
    }
}

#[derive(Default)]
pub struct FakeSource {
    threads: HashMap<String, Vec<ReplyNode>>,
    failing_roots: HashSet<String>,
    prepare_error: Option<String>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
    prepared_roots: Mutex<Vec<usize>>,
}

impl FakeSource {
    pub fn with_thread(mut self, root: &str, replies: Vec<ReplyNode>) -> Self {
        self.threads.insert(root.to_string(), replies);
        self
    }

    pub fn failing_on(mut self, root: &str) -> Self {
        self.failing_roots.insert(root.to_string());
        self
    }

    pub fn failing_prepare(mut self, message: &str) -> Self {
        self.prepare_error = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Root counts passed to each `prepare` call.
    pub fn prepared(&self) -> Vec<usize> {
        self.prepared_roots.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreadSource for FakeSource {
    async fn prepare(&self, roots: &[AtUri]) -> Result<(), PortError> {
        self.prepared_roots.lock().unwrap().push(roots.len());
        match &self.prepare_error {
            Some(message) => Err(PortError::Unauthorized(message.clone())),
            None => Ok(()),
        }
    }

    async fn fetch_replies(&self, root: &AtUri) -> Result<Vec<ReplyNode>, PortError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_roots.contains(root.as_str()) {
            return Err(PortError::Unavailable("thread unavailable".to_string()));
        }
        Ok(self.threads.get(root.as_str()).cloned().unwrap_or_default())
    }
}

pub struct FakeAdapter {
    healthy: bool,
    failing_texts: HashSet<String>,
    requests: Mutex<Vec<CreateCommentRequest>>,
    created: AtomicUsize,
    health_checks: AtomicUsize,
}

impl FakeAdapter {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            failing_texts: HashSet::new(),
            requests: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::healthy()
        }
    }

    /// Rejects any request whose text equals `text`.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing_texts.insert(text.to_string());
        self
    }

    /// Every accepted request, in submission order.
    pub fn requests(&self) -> Vec<CreateCommentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentAdapter for FakeAdapter {
    async fn health_check(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        self.healthy
    }

    async fn create_comment(&self, request: &CreateCommentRequest) -> Result<String, PortError> {
        if self.failing_texts.contains(&request.text) {
            return Err(PortError::Rejected("shim returned 500".to_string()));
        }
        self.requests.lock().unwrap().push(request.clone());
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("comment-{n}"))
    }
}
