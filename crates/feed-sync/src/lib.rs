//! Feed synchronization.
//!
//! A [`FeedSynchronizer`] polls the ledger for every post, orders them by
//! post time (newest first) and publishes the result as an immutable
//! [`FeedView`] snapshot. A failed poll keeps the previous snapshot.
//! Comments are fetched on demand per post, never as part of the poll.

pub mod comments;
pub mod error;
pub mod synchronizer;
pub mod view;

pub use comments::fetch_comments;
pub use error::{SyncError, SyncResult};
pub use synchronizer::{
    FeedSynchronizer, SyncHandle, SyncPhase, SyncStats, DEFAULT_POLL_INTERVAL,
    MIN_POLL_INTERVAL,
};
pub use view::{sort_comments, sort_posts, FeedView};
