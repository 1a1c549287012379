use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::CoreError;

const SCHEME: &str = "at://";

/// An `at://authority/collection/rkey` reference to a record on the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtUri(String);

impl AtUri {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn authority(&self) -> &str {
        self.path_segments().next().unwrap_or_default()
    }

    pub fn collection(&self) -> Option<&str> {
        self.path_segments().nth(1)
    }

    pub fn rkey(&self) -> Option<&str> {
        self.path_segments().nth(2)
    }

    fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.0[SCHEME.len()..].split('/')
    }
}

impl TryFrom<&str> for AtUri {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        let Some(rest) = trimmed.strip_prefix(SCHEME) else {
            return Err(CoreError::InvalidAtUri(trimmed.to_string()));
        };
        if trimmed.chars().any(|ch| ch.is_whitespace()) {
            return Err(CoreError::InvalidAtUri(trimmed.to_string()));
        }
        let rest = rest.trim_end_matches('/');
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() > 3 || segments.iter().any(|segment| segment.is_empty()) {
            return Err(CoreError::InvalidAtUri(trimmed.to_string()));
        }
        Ok(AtUri(format!("{SCHEME}{rest}")))
    }
}

impl TryFrom<String> for AtUri {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AtUri::try_from(value.as_str())
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AtUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::AtUri;

    #[test]
    fn parses_post_uri() {
        let uri = AtUri::try_from("at://did:plc:abc123/app.bsky.feed.post/3kxyz").unwrap();
        assert_eq!(uri.authority(), "did:plc:abc123");
        assert_eq!(uri.collection(), Some("app.bsky.feed.post"));
        assert_eq!(uri.rkey(), Some("3kxyz"));
    }

    #[test]
    fn authority_only_has_no_rkey() {
        let uri = AtUri::try_from("at://alice.bsky.social").unwrap();
        assert_eq!(uri.authority(), "alice.bsky.social");
        assert!(uri.collection().is_none());
        assert!(uri.rkey().is_none());
    }

    #[test]
    fn trims_trailing_slash() {
        let uri = AtUri::try_from(" at://did:plc:abc/app.bsky.feed.post/1/ ").unwrap();
        assert_eq!(uri.as_str(), "at://did:plc:abc/app.bsky.feed.post/1");
    }

    #[test]
    fn rejects_other_schemes_and_gaps() {
        assert!(AtUri::try_from("https://bsky.app/profile/alice").is_err());
        assert!(AtUri::try_from("at://").is_err());
        assert!(AtUri::try_from("at://did:plc:abc//1").is_err());
        assert!(AtUri::try_from("at://did:plc:abc/a/b/c").is_err());
        assert!(AtUri::try_from("at://did:plc:abc/app bsky/1").is_err());
    }
}
