//! Client intents and the payloads they resolve to.
//!
//! Drafts carry optional fields; the conversion into a payload is the single
//! place where missing values receive their defaults.

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

pub const DEFAULT_POST_TEXT: &str = "Default post text";
pub const DEFAULT_COMMENT_TEXT: &str = "Default comment text";
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";
pub const DEFAULT_SOURCE_URL: &str = "https://default.url";

/// Prefix of the text of a post that carries media.
pub const MEDIA_TEXT_PREFIX: &str = "Video Hash: ";

/// A post the user wants to create.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub text: Option<String>,
    pub display_name: Option<String>,
    pub source_url: Option<String>,
    pub content_hash: Option<ContentDigest>,
}

impl PostDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A post whose text encodes the digest of uploaded media.
    pub fn media(digest: ContentDigest) -> Self {
        Self {
            text: Some(format!("{MEDIA_TEXT_PREFIX}{digest}")),
            content_hash: Some(digest),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, display_name: impl Into<String>, source_url: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self.source_url = Some(source_url.into());
        self
    }

    /// `true` when there is neither text nor media to post.
    pub fn is_empty(&self) -> bool {
        self.content_hash.is_none()
            && self.text.as_deref().map_or(true, |t| t.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub text: Option<String>,
    pub display_name: Option<String>,
    pub source_url: Option<String>,
}

impl CommentDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, display_name: impl Into<String>, source_url: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self.source_url = Some(source_url.into());
        self
    }
}

/// Fully-resolved post fields as submitted to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPayload {
    pub text: String,
    pub display_name: String,
    pub source_url: String,
    pub content_hash: Option<ContentDigest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPayload {
    pub text: String,
    pub display_name: String,
    pub source_url: String,
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl From<PostDraft> for PostPayload {
    fn from(draft: PostDraft) -> Self {
        Self {
            text: or_default(draft.text, DEFAULT_POST_TEXT),
            display_name: or_default(draft.display_name, DEFAULT_DISPLAY_NAME),
            source_url: or_default(draft.source_url, DEFAULT_SOURCE_URL),
            content_hash: draft.content_hash,
        }
    }
}

impl From<CommentDraft> for CommentPayload {
    fn from(draft: CommentDraft) -> Self {
        Self {
            text: or_default(draft.text, DEFAULT_COMMENT_TEXT),
            display_name: or_default(draft.display_name, DEFAULT_DISPLAY_NAME),
            source_url: or_default(draft.source_url, DEFAULT_SOURCE_URL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_post_draft_gets_defaults() {
        let payload = PostPayload::from(PostDraft::default());
        assert_eq!(payload.text, DEFAULT_POST_TEXT);
        assert_eq!(payload.display_name, DEFAULT_DISPLAY_NAME);
        assert_eq!(payload.source_url, DEFAULT_SOURCE_URL);
        assert!(payload.content_hash.is_none());
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let draft = PostDraft {
            text: Some("hi".into()),
            display_name: Some(String::new()),
            ..Default::default()
        };
        let payload = PostPayload::from(draft);
        assert_eq!(payload.text, "hi");
        assert_eq!(payload.display_name, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn comment_defaults() {
        let payload = CommentPayload::from(CommentDraft::default());
        assert_eq!(payload.text, DEFAULT_COMMENT_TEXT);
    }

    #[test]
    fn media_draft_encodes_digest_in_text() {
        let digest = ContentDigest::from_bytes([0x0f; 64]);
        let draft = PostDraft::media(digest);
        assert_eq!(draft.text.as_deref(), Some(format!("Video Hash: {}", digest.to_hex()).as_str()));
        assert_eq!(draft.content_hash, Some(digest));
        assert!(!draft.is_empty());
    }

    #[test]
    fn whitespace_only_draft_is_empty() {
        assert!(PostDraft::text("   ").is_empty());
        assert!(PostDraft::default().is_empty());
        assert!(!PostDraft::text("x").is_empty());
    }

    #[test]
    fn with_author_sets_both_fields() {
        let d = CommentDraft::text("nice").with_author("bob", "https://bob.example");
        let p = CommentPayload::from(d);
        assert_eq!(p.display_name, "bob");
        assert_eq!(p.source_url, "https://bob.example");
    }
}
