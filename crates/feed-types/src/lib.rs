//! Foundation types for the feed sync client.
//!
//! Every other feed crate depends on `feed-types`. Nothing here performs I/O;
//! these are the values that flow between the deriver, the writer, the
//! ledger boundary and the synchronizer.
//!
//! # Key Types
//!
//! - [`Address`] / [`ProgramId`]: 32-byte ledger account identifiers
//! - [`Namespace`] / [`AccountLocator`]: seed material for address derivation
//! - [`Identity`]: author identity (public key bytes)
//! - [`ContentDigest`]: SHA-512 digest of uploaded media
//! - [`PostAccount`], [`CommentAccount`], [`StateAccount`]: ledger-resident records
//! - [`PostDraft`], [`CommentDraft`]: client intents with explicit defaults

pub mod account;
pub mod address;
pub mod digest;
pub mod draft;
pub mod error;
pub mod identity;
pub mod namespace;

pub use account::{
    Account, AccountKind, AccountPayload, CommentAccount, CommentEntry, LedgerEntry,
    PostAccount, PostEntry, StateAccount,
};
pub use address::{Address, ProgramId};
pub use digest::ContentDigest;
pub use draft::{
    CommentDraft, CommentPayload, PostDraft, PostPayload, DEFAULT_COMMENT_TEXT, DEFAULT_DISPLAY_NAME,
    DEFAULT_POST_TEXT, DEFAULT_SOURCE_URL, MEDIA_TEXT_PREFIX,
};
pub use error::TypeError;
pub use identity::Identity;
pub use namespace::{AccountLocator, Namespace};
