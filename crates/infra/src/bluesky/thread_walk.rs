use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::BlueskyClient;
use super::types::ThreadNode;
use ghostsky_core::domain::comments::ReplyNode;
use ghostsky_core::error::PortError;
use ghostsky_core::ports::ThreadSource;
use ghostsky_core::types::at_uri::AtUri;

/// Deepest reply chain requested from the app view. Each level nests two JSON
/// containers, and the response must stay inside serde_json's recursion limit.
pub const MAX_THREAD_DEPTH: u16 = 50;

/// Fetches the whole thread under a root and flattens it. One request per
/// post, complete up to `depth`.
#[derive(Debug, Clone)]
pub struct ThreadWalkSource {
    client: Arc<BlueskyClient>,
    depth: u16,
}

impl ThreadWalkSource {
    /// `depth` is clamped to `1..=MAX_THREAD_DEPTH`.
    pub fn new(client: Arc<BlueskyClient>, depth: u16) -> Self {
        Self {
            client,
            depth: depth.clamp(1, MAX_THREAD_DEPTH),
        }
    }
}

#[async_trait]
impl ThreadSource for ThreadWalkSource {
    async fn prepare(&self, _roots: &[AtUri]) -> Result<(), PortError> {
        Ok(self.client.authenticate().await?)
    }

    async fn fetch_replies(&self, root: &AtUri) -> Result<Vec<ReplyNode>, PortError> {
        let thread = self.client.get_post_thread(root, self.depth).await?;
        let replies = flatten_thread(root, thread);
        debug!(root = %root, replies = replies.len(), "thread walk complete");
        Ok(replies)
    }
}

/// Depth-first flattening with an explicit stack. The root itself is not a
/// reply; hidden nodes drop out together with their subtrees.
pub(crate) fn flatten_thread(root: &AtUri, thread: ThreadNode) -> Vec<ReplyNode> {
    let mut replies = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![thread];
    while let Some(node) = stack.pop() {
        let view = match node {
            ThreadNode::Post(view) => view,
            ThreadNode::NotFound(missing) => {
                debug!(uri = %missing.uri, "skipping missing thread node");
                continue;
            }
            ThreadNode::Blocked(missing) => {
                debug!(uri = %missing.uri, "skipping blocked thread node");
                continue;
            }
            ThreadNode::Unknown => continue,
        };
        // Reverse so the first child is visited first.
        stack.extend(view.replies.into_iter().rev());
        if view.post.uri == root.as_str() {
            continue;
        }
        match view.post.into_reply() {
            Ok(reply) => {
                if seen.insert(reply.uri.clone()) {
                    replies.push(reply);
                }
            }
            Err(err) => warn!(error = %err, root = %root, "dropping unreadable reply"),
        }
    }
    replies
}
