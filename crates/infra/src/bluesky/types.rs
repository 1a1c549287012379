use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ghostsky_core::domain::comments::{AuthorIdentity, ReplyNode};
use ghostsky_core::types::at_uri::AtUri;

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSessionResponse {
    #[serde(rename = "accessJwt")]
    pub access_jwt: String,
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct XrpcErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetPostThreadResponse {
    pub thread: ThreadNode,
}

/// A node of `app.bsky.feed.getPostThread`, narrowed on `$type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum ThreadNode {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    Post(ThreadViewPost),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound(MissingPost),
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked(MissingPost),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadViewPost {
    pub post: PostView,
    #[serde(default)]
    pub replies: Vec<ThreadNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MissingPost {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: ProfileView,
    pub record: PostRecord,
    #[serde(rename = "indexedAt")]
    pub indexed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileView {
    pub did: String,
    pub handle: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
    pub reply: Option<ReplyRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyRef {
    pub parent: StrongRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StrongRef {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
}

/// A notification, narrowed on `reason`. Only replies carry data we use.
#[derive(Debug, Deserialize)]
#[serde(tag = "reason")]
pub(crate) enum Notification {
    #[serde(rename = "reply")]
    Reply(ReplyNotification),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyNotification {
    pub uri: String,
    pub cid: String,
    pub author: ProfileView,
    pub record: PostRecord,
    #[serde(rename = "indexedAt")]
    pub indexed_at: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum ConvertError {
    #[error("invalid uri {0}")]
    InvalidUri(String),
    #[error("no usable timestamp on {0}")]
    MissingTimestamp(String),
}

impl PostView {
    pub fn into_reply(self) -> Result<ReplyNode, ConvertError> {
        reply_node(self.uri, self.cid, self.author, self.record, self.indexed_at)
    }
}

impl ReplyNotification {
    pub fn into_reply(self) -> Result<ReplyNode, ConvertError> {
        reply_node(self.uri, self.cid, self.author, self.record, self.indexed_at)
    }
}

fn reply_node(
    uri: String,
    cid: String,
    author: ProfileView,
    record: PostRecord,
    indexed_at: Option<String>,
) -> Result<ReplyNode, ConvertError> {
    let parsed = AtUri::try_from(uri.as_str()).map_err(|_| ConvertError::InvalidUri(uri.clone()))?;
    // Clients set createdAt; the app view's indexedAt only stands in when it is unusable.
    let created_at = record
        .created_at
        .as_deref()
        .and_then(parse_datetime)
        .or_else(|| indexed_at.as_deref().and_then(parse_datetime))
        .ok_or_else(|| ConvertError::MissingTimestamp(uri.clone()))?;
    let parent_uri = match record.reply {
        Some(reply) => Some(
            AtUri::try_from(reply.parent.uri.as_str())
                .map_err(|_| ConvertError::InvalidUri(reply.parent.uri.clone()))?,
        ),
        None => None,
    };
    Ok(ReplyNode {
        uri: parsed,
        cid,
        author: AuthorIdentity {
            did: author.did,
            handle: author.handle,
            display_name: author.display_name.filter(|name| !name.trim().is_empty()),
        },
        text: record.text,
        created_at,
        parent_uri,
    })
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
