//! Per-post reconciliation of social replies against recorded comment mappings.
//!
//! Replies are processed oldest-first by their client-claimed `createdAt`, so a
//! parent synced in the same run is usually mapped before its children. The
//! timestamps are not verified; a child stamped earlier than its parent is
//! posted as a top-level comment.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use ghostsky_core::domain::comments::{
    CommentMapping, CreateCommentRequest, EligiblePost, Ineligible, Post, ReplyNode, SyncResult,
};
use ghostsky_core::domain::links::{post_url, profile_url};
use ghostsky_core::error::PortError;
use ghostsky_core::ports::{CommentAdapter, MappingStore, PostStore, ThreadSource};
use ghostsky_core::types::at_uri::AtUri;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("post lookup failed: {0}")]
    PostLookup(PortError),
    #[error("mapping lookup failed: {0}")]
    MappingLookup(PortError),
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub call_timeout: Duration,
    pub profile_base_url: String,
}

/// Everything one post's reconciliation talks to.
pub struct Reconciler<'a> {
    pub posts: &'a dyn PostStore,
    pub mappings: &'a dyn MappingStore,
    pub source: &'a dyn ThreadSource,
    pub adapter: &'a dyn CommentAdapter,
    pub settings: &'a ReconcileSettings,
}

impl Reconciler<'_> {
    /// Syncs new replies of one post. Eligibility and fetch failures come back
    /// as a result carrying a single error; only store failures are `Err`.
    pub async fn sync_post(&self, post_id: &str) -> Result<SyncResult, SyncError> {
        let post = self
            .posts
            .find_post(post_id)
            .await
            .map_err(SyncError::PostLookup)?;
        let post = match eligible_post(post_id, post) {
            Ok(post) => post,
            Err(result) => return Ok(result),
        };

        let mut lookup: HashMap<AtUri, String> = self
            .mappings
            .mappings_for_post(&post.id)
            .await
            .map_err(SyncError::MappingLookup)?
            .into_iter()
            .map(|mapping| (mapping.bluesky_uri, mapping.ghost_comment_id))
            .collect();

        let fetched = self
            .bounded(self.source.fetch_replies(&post.thread_uri))
            .await;
        let mut replies = match fetched {
            Ok(replies) => replies,
            Err(err) => {
                warn!(error = %err, post_id = %post.id, root = %post.thread_uri, "thread fetch failed");
                return Ok(SyncResult::fatal(
                    &post.id,
                    format!("failed to fetch thread {}: {err}", post.thread_uri),
                ));
            }
        };
        replies.sort_by_key(|reply| reply.created_at);

        let mut result = SyncResult::new(&post.id);
        let mut skipped = 0usize;
        for reply in &replies {
            if lookup.contains_key(&reply.uri) {
                skipped += 1;
                continue;
            }
            let parent_comment_id = self.resolve_parent(reply, &post.thread_uri, &lookup).await;
            let request = self.build_request(&post.ghost_post_id, reply, parent_comment_id);
            let comment_id = match self.bounded(self.adapter.create_comment(&request)).await {
                Ok(comment_id) => comment_id,
                Err(err) => {
                    warn!(error = %err, post_id = %post.id, reply = %reply.uri, "comment submission failed");
                    result
                        .errors
                        .push(format!("{}: comment submission failed: {err}", reply.uri));
                    continue;
                }
            };
            let mapping = CommentMapping {
                bluesky_uri: reply.uri.clone(),
                ghost_comment_id: comment_id.clone(),
                post_id: post.id.clone(),
                author_did: reply.author.did.clone(),
                author_handle: reply.author.handle.clone(),
                recorded_at: Utc::now(),
            };
            // Later siblings in this run may reply to this one.
            match self.mappings.record_mapping(&mapping).await {
                Ok(true) => {
                    result.new_comments += 1;
                    lookup.insert(reply.uri.clone(), comment_id);
                }
                Ok(false) => {
                    warn!(post_id = %post.id, reply = %reply.uri, comment_id = %comment_id, "reply already recorded by another run");
                    match self.mappings.find_mapping(&reply.uri).await {
                        Ok(Some(stored)) => {
                            lookup.insert(reply.uri.clone(), stored.ghost_comment_id);
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, reply = %reply.uri, "stored mapping read-back failed");
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, post_id = %post.id, reply = %reply.uri, comment_id = %comment_id, "mapping write failed");
                    result.errors.push(format!(
                        "{}: comment {comment_id} created but mapping not recorded: {err}",
                        reply.uri
                    ));
                    lookup.insert(reply.uri.clone(), comment_id);
                }
            }
        }

        info!(
            post_id = %post.id,
            fetched = replies.len(),
            skipped,
            new_comments = result.new_comments,
            errors = result.errors.len(),
            "post reconciled"
        );
        Ok(result)
    }

    fn build_request(
        &self,
        ghost_post_id: &str,
        reply: &ReplyNode,
        parent_comment_id: Option<String>,
    ) -> CreateCommentRequest {
        let base = self.settings.profile_base_url.as_str();
        CreateCommentRequest {
            post_id: ghost_post_id.to_string(),
            author_handle: reply.author.handle.clone(),
            author_profile_url: profile_url(base, &reply.author),
            author_post_url: post_url(base, &reply.author, &reply.uri),
            text: reply.text.clone(),
            parent_comment_id,
            created_at: reply.created_at,
        }
    }

    /// Top level when the reply answers the thread root, has no parent, or its
    /// parent has not been mapped (yet). Parents missing from this run's lookup
    /// are checked against the store, which another run may have written to.
    async fn resolve_parent(
        &self,
        reply: &ReplyNode,
        root: &AtUri,
        lookup: &HashMap<AtUri, String>,
    ) -> Option<String> {
        let parent = reply.parent_uri.as_ref()?;
        if parent == root {
            return None;
        }
        if let Some(comment_id) = lookup.get(parent) {
            return Some(comment_id.clone());
        }
        match self.mappings.find_mapping(parent).await {
            Ok(Some(stored)) => Some(stored.ghost_comment_id),
            Ok(None) => {
                debug!(reply = %reply.uri, parent = %parent, "parent not mapped; posting top-level");
                None
            }
            Err(err) => {
                warn!(error = %err, reply = %reply.uri, parent = %parent, "parent lookup failed; posting top-level");
                None
            }
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, PortError>>) -> Result<T, PortError> {
        let limit = self.settings.call_timeout;
        match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Timeout(limit)),
        }
    }
}

/// Maps a looked-up post to its eligible form, or to the fatal result
/// explaining why it cannot be synced.
pub(crate) fn eligible_post(post_id: &str, post: Option<Post>) -> Result<EligiblePost, SyncResult> {
    let Some(post) = post else {
        return Err(SyncResult::fatal(post_id, format!("post {post_id} not found")));
    };
    post.eligible().map_err(|reason| {
        let message = match reason {
            Ineligible::MissingGhostId => format!("post {post_id} has no content platform id"),
            Ineligible::MissingThreadUri => format!("post {post_id} has no bluesky thread uri"),
        };
        SyncResult::fatal(post_id, message)
    })
}
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ReconcileSettings, Reconciler, SyncError};
    use crate::testing::{FakeAdapter, FakeSource, FakeStore, ROOT, at, mapping, post, reply};
    use ghostsky_core::domain::comments::SyncResult;

    fn settings() -> ReconcileSettings {
        ReconcileSettings {
            call_timeout: Duration::from_secs(5),
            profile_base_url: "https://bsky.app".to_string(),
        }
    }

    async fn run(
        store: &FakeStore,
        source: &FakeSource,
        adapter: &FakeAdapter,
        post_id: &str,
    ) -> Result<SyncResult, SyncError> {
        let settings = settings();
        Reconciler {
            posts: store,
            mappings: store,
            source,
            adapter,
            settings: &settings,
        }
        .sync_post(post_id)
        .await
    }

    #[tokio::test]
    async fn second_run_without_new_replies_is_a_no_op() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default().with_thread(
            ROOT,
            vec![reply("a", 1, Some(ROOT)), reply("b", 2, Some(ROOT))],
        );
        let adapter = FakeAdapter::healthy();

        let first = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(first.new_comments, 2);
        assert!(first.errors.is_empty());

        let second = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(second.new_comments, 0);
        assert!(second.errors.is_empty());
        assert_eq!(store.mapping_count(), 2);
        assert_eq!(adapter.requests().len(), 2);
    }

    #[tokio::test]
    async fn previously_mapped_replies_are_skipped() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))])
            .with_mappings(vec![mapping("a", "c-existing", "p1")]);
        let source = FakeSource::default().with_thread(
            ROOT,
            vec![reply("a", 1, Some(ROOT)), reply("b", 2, Some(at("a").as_str()))],
        );
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 1);
        let requests = adapter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].text, "b");
        assert_eq!(requests[0].parent_comment_id.as_deref(), Some("c-existing"));
    }

    #[tokio::test]
    async fn one_failing_reply_does_not_block_the_rest() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default().with_thread(
            ROOT,
            vec![
                reply("a", 1, Some(ROOT)),
                reply("b", 2, Some(ROOT)),
                reply("c", 3, Some(ROOT)),
                reply("d", 4, Some(ROOT)),
            ],
        );
        let adapter = FakeAdapter::healthy().failing_on("b");

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 3);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains(&at("b")));
        assert!(store.has_mapping(&at("a")));
        assert!(!store.has_mapping(&at("b")));
        assert!(store.has_mapping(&at("c")));
        assert!(store.has_mapping(&at("d")));
    }

    #[tokio::test]
    async fn failed_reply_is_retried_on_the_next_run() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default().with_thread(ROOT, vec![reply("a", 1, Some(ROOT))]);

        let failing = FakeAdapter::healthy().failing_on("a");
        let first = run(&store, &source, &failing, "p1").await.unwrap();
        assert_eq!(first.new_comments, 0);
        assert_eq!(first.errors.len(), 1);

        let working = FakeAdapter::healthy();
        let second = run(&store, &source, &working, "p1").await.unwrap();
        assert_eq!(second.new_comments, 1);
        assert!(store.has_mapping(&at("a")));
    }

    #[tokio::test]
    async fn unmapped_parent_falls_back_to_top_level() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default()
            .with_thread(ROOT, vec![reply("orphan", 1, Some(at("outside-window").as_str()))]);
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 1);
        assert_eq!(adapter.requests()[0].parent_comment_id, None);
    }

    #[tokio::test]
    async fn replies_are_ordered_by_claimed_timestamp() {
        // C claims to predate its parent B, so it cannot be nested.
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default().with_thread(
            ROOT,
            vec![
                reply("b", 2, Some(at("a").as_str())),
                reply("a", 1, Some(ROOT)),
                reply("c", 0, Some(at("b").as_str())),
            ],
        );
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 3);
        let requests = adapter.requests();
        let order: Vec<&str> = requests.iter().map(|request| request.text.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(requests[0].parent_comment_id, None);
        assert_eq!(requests[1].parent_comment_id, None);
        assert_eq!(requests[2].parent_comment_id.as_deref(), Some("comment-2"));
    }

    #[tokio::test]
    async fn ineligible_posts_make_no_external_calls() {
        let store = FakeStore::with_posts(vec![
            post("no-ghost", None, Some(ROOT)),
            post("no-thread", Some("g2"), None),
        ]);
        let source = FakeSource::default().with_thread(ROOT, vec![reply("a", 1, Some(ROOT))]);
        let adapter = FakeAdapter::healthy();

        for (post_id, expected) in [
            ("no-ghost", "has no content platform id"),
            ("no-thread", "has no bluesky thread uri"),
            ("missing", "not found"),
        ] {
            let result = run(&store, &source, &adapter, post_id).await.unwrap();
            assert_eq!(result.new_comments, 0);
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains(expected), "{}", result.errors[0]);
        }
        assert_eq!(source.fetch_count(), 0);
        assert!(adapter.requests().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal_and_writes_nothing() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default().failing_on(ROOT);
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("failed to fetch thread"));
        assert_eq!(store.mapping_count(), 0);
        assert!(adapter.requests().is_empty());
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default()
            .with_thread(ROOT, vec![reply("a", 1, Some(ROOT))])
            .with_delay(Duration::from_millis(500));
        let adapter = FakeAdapter::healthy();
        let settings = ReconcileSettings {
            call_timeout: Duration::from_millis(20),
            profile_base_url: "https://bsky.app".to_string(),
        };

        let result = Reconciler {
            posts: &store,
            mappings: &store,
            source: &source,
            adapter: &adapter,
            settings: &settings,
        }
        .sync_post("p1")
        .await
        .unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn request_carries_derived_links() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))]);
        let source = FakeSource::default().with_thread(ROOT, vec![reply("a", 1, Some(ROOT))]);
        let adapter = FakeAdapter::healthy();

        run(&store, &source, &adapter, "p1").await.unwrap();
        let request = &adapter.requests()[0];
        assert_eq!(request.post_id, "g1");
        assert_eq!(request.author_handle, "user-a.test");
        assert_eq!(request.author_profile_url, "https://bsky.app/profile/user-a.test");
        assert_eq!(
            request.author_post_url,
            "https://bsky.app/profile/user-a.test/post/a"
        );
    }

    #[tokio::test]
    async fn mapping_write_failure_is_reported_per_reply() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))])
            .rejecting_writes_for(&at("a"));
        let source = FakeSource::default().with_thread(
            ROOT,
            vec![reply("a", 1, Some(ROOT)), reply("b", 2, Some(at("a").as_str()))],
        );
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("mapping not recorded"));
        // b still nests under the comment created for a.
        assert_eq!(
            adapter.requests()[1].parent_comment_id.as_deref(),
            Some("comment-1")
        );
    }

    #[tokio::test]
    async fn duplicate_write_nests_children_under_the_stored_comment() {
        // Another run records a before this one does.
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))])
            .racing_with(mapping("a", "comment-theirs", "p1"));
        let source = FakeSource::default().with_thread(
            ROOT,
            vec![reply("a", 1, Some(ROOT)), reply("b", 2, Some(at("a").as_str()))],
        );
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 1);
        assert!(result.errors.is_empty());
        let requests = adapter.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].parent_comment_id.as_deref(),
            Some("comment-theirs")
        );
    }

    #[tokio::test]
    async fn parent_mapped_by_another_post_run_is_found_in_the_store() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))])
            .with_mappings(vec![mapping("a", "comment-elsewhere", "p2")]);
        let source = FakeSource::default()
            .with_thread(ROOT, vec![reply("b", 2, Some(at("a").as_str()))]);
        let adapter = FakeAdapter::healthy();

        let result = run(&store, &source, &adapter, "p1").await.unwrap();
        assert_eq!(result.new_comments, 1);
        assert_eq!(
            adapter.requests()[0].parent_comment_id.as_deref(),
            Some("comment-elsewhere")
        );
    }

    #[tokio::test]
    async fn store_failures_surface_as_errors() {
        let store = FakeStore::with_posts(vec![post("p1", Some("g1"), Some(ROOT))])
            .failing_mapping_reads();
        let source = FakeSource::default();
        let adapter = FakeAdapter::healthy();

        let err = run(&store, &source, &adapter, "p1").await.unwrap_err();
        assert!(matches!(err, SyncError::MappingLookup(_)));
        assert_eq!(source.fetch_count(), 0);
    }
}
