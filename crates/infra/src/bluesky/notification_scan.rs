use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::BlueskyClient;
use super::types::Notification;
use ghostsky_core::domain::comments::ReplyNode;
use ghostsky_core::error::PortError;
use ghostsky_core::ports::ThreadSource;
use ghostsky_core::types::at_uri::AtUri;

/// The account's notification stream, newest first.
#[async_trait]
pub(crate) trait NotificationFeed: std::fmt::Debug + Send + Sync {
    async fn recent_notifications(&self, window: u16) -> Result<Vec<Notification>, PortError>;

    /// Account label for logs.
    fn label(&self) -> &str;
}

#[async_trait]
impl NotificationFeed for BlueskyClient {
    async fn recent_notifications(&self, window: u16) -> Result<Vec<Notification>, PortError> {
        Ok(self.list_notifications(window).await?)
    }

    fn label(&self) -> &str {
        self.identifier()
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    tracked: HashSet<AtUri>,
    replies: HashMap<AtUri, Vec<ReplyNode>>,
}

/// Reads the account's most recent `window` notifications once and serves
/// direct replies to tracked roots from that snapshot. Replies that have
/// scrolled out of the window are invisible here.
#[derive(Debug)]
pub struct NotificationScanSource {
    feed: Arc<dyn NotificationFeed>,
    window: u16,
    snapshot: Mutex<Option<Snapshot>>,
}

impl NotificationScanSource {
    pub fn new(client: Arc<BlueskyClient>, window: u16) -> Self {
        Self::with_feed(client, window)
    }

    pub(crate) fn with_feed(feed: Arc<dyn NotificationFeed>, window: u16) -> Self {
        Self {
            feed,
            window,
            snapshot: Mutex::new(None),
        }
    }

    async fn load(&self, tracked: HashSet<AtUri>) -> Result<Snapshot, PortError> {
        let notifications = self.feed.recent_notifications(self.window).await?;
        let total = notifications.len();
        let replies = group_replies(notifications, &tracked);
        info!(
            identifier = %self.feed.label(),
            notifications = total,
            tracked_roots = tracked.len(),
            matched_roots = replies.len(),
            "notification window scanned"
        );
        Ok(Snapshot { tracked, replies })
    }
}

#[async_trait]
impl ThreadSource for NotificationScanSource {
    async fn prepare(&self, roots: &[AtUri]) -> Result<(), PortError> {
        let snapshot = self.load(roots.iter().cloned().collect()).await?;
        *self.snapshot.lock().await = Some(snapshot);
        Ok(())
    }

    async fn fetch_replies(&self, root: &AtUri) -> Result<Vec<ReplyNode>, PortError> {
        let mut guard = self.snapshot.lock().await;
        let covered = guard
            .as_ref()
            .is_some_and(|snapshot| snapshot.tracked.contains(root));
        if !covered {
            debug!(root = %root, "root not in notification snapshot; rescanning");
            let mut tracked = guard
                .take()
                .map(|snapshot| snapshot.tracked)
                .unwrap_or_default();
            tracked.insert(root.clone());
            *guard = Some(self.load(tracked).await?);
        }
        let replies = guard
            .as_ref()
            .and_then(|snapshot| snapshot.replies.get(root))
            .cloned()
            .unwrap_or_default();
        Ok(replies)
    }
}

/// Keeps reply notifications whose parent is one of `roots`, grouped by that
/// root and de-duplicated by reply URI.
pub(crate) fn group_replies(
    notifications: Vec<Notification>,
    roots: &HashSet<AtUri>,
) -> HashMap<AtUri, Vec<ReplyNode>> {
    let mut grouped: HashMap<AtUri, Vec<ReplyNode>> = HashMap::new();
    let mut seen = HashSet::new();
    for notification in notifications {
        let Notification::Reply(event) = notification else {
            continue;
        };
        let reply = match event.into_reply() {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "dropping unreadable reply notification");
                continue;
            }
        };
        let Some(parent) = reply.parent_uri.clone() else {
            continue;
        };
        if !roots.contains(&parent) || !seen.insert(reply.uri.clone()) {
            continue;
        }
        grouped.entry(parent).or_default().push(reply);
    }
    grouped
}
