use crate::domain::comments::AuthorIdentity;
use crate::types::at_uri::AtUri;

pub const DEFAULT_WEB_BASE_URL: &str = "https://bsky.app";

/// Public profile link for an author. Falls back to the DID when the handle
/// is blank.
pub fn profile_url(base: &str, author: &AuthorIdentity) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}/profile/{}", profile_key(author))
}

/// Public link to a single post by `author`.
pub fn post_url(base: &str, author: &AuthorIdentity, uri: &AtUri) -> String {
    match uri.rkey() {
        Some(rkey) => format!("{}/post/{rkey}", profile_url(base, author)),
        None => profile_url(base, author),
    }
}

fn profile_key(author: &AuthorIdentity) -> &str {
    let handle = author.handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        author.did.as_str()
    } else {
        handle
    }
}
