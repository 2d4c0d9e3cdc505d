use std::cmp::Ordering;

use serde::Serialize;

use feed_crypto::Fingerprinter;
use feed_types::{CommentEntry, PostEntry};

/// Newest first; equal post times fall back to address order.
pub fn sort_posts(posts: &mut [PostEntry]) {
    posts.sort_by(|a, b| match b.post.post_time.cmp(&a.post.post_time) {
        Ordering::Equal => a.address.cmp(&b.address),
        other => other,
    });
}

/// Oldest first; equal post times fall back to comment index.
pub fn sort_comments(comments: &mut [CommentEntry]) {
    comments.sort_by(|a, b| {
        a.comment
            .post_time
            .cmp(&b.comment.post_time)
            .then(a.comment.comment_index.cmp(&b.comment.comment_index))
    });
}

/// One published snapshot of the feed.
///
/// Snapshots are immutable. Each successful poll builds a new one and
/// replaces the old one wholesale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedView {
    posts: Vec<PostEntry>,
    #[serde(serialize_with = "serialize_fingerprint")]
    fingerprint: [u8; 32],
    generation: u64,
    changed: bool,
}

impl FeedView {
    /// The view before the first successful fetch.
    pub fn empty() -> Self {
        Self {
            posts: Vec::new(),
            fingerprint: fingerprint(&[]),
            generation: 0,
            changed: false,
        }
    }

    /// Order `posts` and build the snapshot that follows `previous`.
    pub fn next(mut posts: Vec<PostEntry>, previous: &FeedView) -> Self {
        sort_posts(&mut posts);
        let fingerprint = fingerprint(&posts);
        Self {
            changed: fingerprint != previous.fingerprint,
            posts,
            fingerprint,
            generation: previous.generation + 1,
        }
    }

    pub fn posts(&self) -> &[PostEntry] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Number of successful polls this view descends from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the content differs from the snapshot it replaced.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }

    /// Look up a post by its counter index.
    pub fn post(&self, index: u64) -> Option<&PostEntry> {
        self.posts.iter().find(|entry| entry.post.index == index)
    }
}

impl Default for FeedView {
    fn default() -> Self {
        Self::empty()
    }
}

// Covers what polling can change: membership, likes and comment counts.
fn fingerprint(posts: &[PostEntry]) -> [u8; 32] {
    let mut fp = Fingerprinter::new(Fingerprinter::VIEW);
    fp.update_u64(posts.len() as u64);
    for entry in posts {
        fp.update(entry.address.as_bytes())
            .update_u64(entry.post.like_count)
            .update_u64(entry.post.comment_count);
    }
    fp.finalize()
}

fn serialize_fingerprint<S: serde::Serializer>(fp: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(fp))
}
