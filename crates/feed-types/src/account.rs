//! Ledger-resident records and the payloads used to create them.
//!
//! The ledger owns every record here. The client only ever holds copies
//! fetched on a poll, and those copies are discarded on the next one.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::digest::ContentDigest;
use crate::draft::{CommentPayload, PostPayload};
use crate::identity::Identity;

/// The singleton counter record. `post_count` equals the number of posts
/// ever created and only moves forward, atomically with each post create.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAccount {
    pub authority: Option<Identity>,
    pub post_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAccount {
    pub index: u64,
    pub author: Identity,
    pub display_name: String,
    pub source_url: String,
    pub text: String,
    pub content_hash: Option<ContentDigest>,
    /// Ledger clock at creation, unix seconds.
    pub post_time: i64,
    pub like_count: u64,
    pub likers: Vec<Identity>,
    /// Advanced only by successful comment creates.
    pub comment_count: u64,
}

impl PostAccount {
    pub fn is_liked_by(&self, who: &Identity) -> bool {
        self.likers.contains(who)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAccount {
    pub post_index: u64,
    pub comment_index: u64,
    pub author: Identity,
    pub display_name: String,
    pub source_url: String,
    pub text: String,
    pub post_time: i64,
}

/// Kinds of account the feed program owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    State,
    Post,
    Comment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Account {
    State(StateAccount),
    Post(PostAccount),
    Comment(CommentAccount),
}

impl Account {
    pub fn kind(&self) -> AccountKind {
        match self {
            Self::State(_) => AccountKind::State,
            Self::Post(_) => AccountKind::Post,
            Self::Comment(_) => AccountKind::Comment,
        }
    }

    pub fn as_state(&self) -> Option<&StateAccount> {
        match self {
            Self::State(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_post(&self) -> Option<&PostAccount> {
        match self {
            Self::Post(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_comment(&self) -> Option<&CommentAccount> {
        match self {
            Self::Comment(c) => Some(c),
            _ => None,
        }
    }
}

/// A fetched account together with the address it lives at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub address: Address,
    pub account: Account,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntry {
    pub address: Address,
    pub post: PostAccount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEntry {
    pub address: Address,
    pub comment: CommentAccount,
}

impl TryFrom<LedgerEntry> for PostEntry {
    type Error = AccountKind;

    fn try_from(entry: LedgerEntry) -> Result<Self, Self::Error> {
        match entry.account {
            Account::Post(post) => Ok(Self {
                address: entry.address,
                post,
            }),
            other => Err(other.kind()),
        }
    }
}

impl TryFrom<LedgerEntry> for CommentEntry {
    type Error = AccountKind;

    fn try_from(entry: LedgerEntry) -> Result<Self, Self::Error> {
        match entry.account {
            Account::Comment(comment) => Ok(Self {
                address: entry.address,
                comment,
            }),
            other => Err(other.kind()),
        }
    }
}

/// What the client submits to create an account. Indices, author and time
/// are filled in by the ledger from its own state and the signing authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AccountPayload {
    State,
    Post(PostPayload),
    Comment {
        post_index: u64,
        #[serde(flatten)]
        payload: CommentPayload,
    },
}

impl AccountPayload {
    pub fn kind(&self) -> AccountKind {
        match self {
            Self::State => AccountKind::State,
            Self::Post(_) => AccountKind::Post,
            Self::Comment { .. } => AccountKind::Comment,
        }
    }
}
