//! Client session for the content-addressed feed.
//!
//! [`FeedSession`] is the entry point for applications: it turns user
//! intents (post, comment, like, media) into derive-then-write sequences
//! against a [`Ledger`] and keeps a time-ordered view of the feed fresh in
//! the background.

pub mod config;
pub mod error;
pub mod media;
pub mod session;

pub use config::{RetryPolicy, SessionConfig};
pub use error::{SdkError, SdkResult, UploadError};
pub use media::{
    BytesSource, FileSource, InMemoryUploader, MediaReader, MediaSource, MediaUploader, NoopUploader,
};
pub use session::{FeedSession, MediaReceipt, WriteReceipt};

// Re-export the types applications handle directly.
pub use feed_ledger::{InMemoryLedger, Ledger, LikeOutcome, WriteOutcome};
pub use feed_sync::{FeedView, SyncPhase, SyncStats};
pub use feed_types::{
    CommentDraft, CommentEntry, ContentDigest, Identity, PostDraft, PostEntry, ProgramId,
};
