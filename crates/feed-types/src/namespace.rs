use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Tag scoping address derivation. Each entity kind has its own namespace
/// and tags are never shared between kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// The singleton record holding the global post counter.
    State,
    Post,
    Comment,
}

impl Namespace {
    /// The seed tag hashed into every address of this namespace.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Namespace {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "state" => Ok(Self::State),
            "post" => Ok(Self::Post),
            "comment" => Ok(Self::Comment),
            other => Err(TypeError::UnknownNamespace(other.to_string())),
        }
    }
}

/// Logical position of an account: a namespace plus its indices.
///
/// This is the full input to address derivation apart from the program
/// identity. Indices are encoded big-endian and fixed-width (8 bytes) so that
/// the lexicographic order of seed bytes matches numeric order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountLocator {
    State,
    Post { index: u64 },
    Comment { post_index: u64, comment_index: u64 },
}

impl AccountLocator {
    pub const fn post(index: u64) -> Self {
        Self::Post { index }
    }

    pub const fn comment(post_index: u64, comment_index: u64) -> Self {
        Self::Comment {
            post_index,
            comment_index,
        }
    }

    pub const fn namespace(&self) -> Namespace {
        match self {
            Self::State => Namespace::State,
            Self::Post { .. } => Namespace::Post,
            Self::Comment { .. } => Namespace::Comment,
        }
    }

    /// Seed list in derivation order: the namespace tag, then each index.
    pub fn seeds(&self) -> Vec<Vec<u8>> {
        let tag = self.namespace().tag().as_bytes().to_vec();
        match *self {
            Self::State => vec![tag],
            Self::Post { index } => vec![tag, index.to_be_bytes().to_vec()],
            Self::Comment {
                post_index,
                comment_index,
            } => vec![
                tag,
                post_index.to_be_bytes().to_vec(),
                comment_index.to_be_bytes().to_vec(),
            ],
        }
    }

    /// Locator of the record whose counter allocated this one, if any.
    ///
    /// Posts are counted by the state record; comments by their parent post.
    pub const fn counter(&self) -> Option<AccountLocator> {
        match *self {
            Self::State => None,
            Self::Post { .. } => Some(Self::State),
            Self::Comment { post_index, .. } => Some(Self::Post { index: post_index }),
        }
    }

    /// The counter value this entry was allocated at.
    pub const fn index(&self) -> Option<u64> {
        match *self {
            Self::State => None,
            Self::Post { index } => Some(index),
            Self::Comment { comment_index, .. } => Some(comment_index),
        }
    }
}

impl fmt::Display for AccountLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State => write!(f, "state"),
            Self::Post { index } => write!(f, "post/{index}"),
            Self::Comment {
                post_index,
                comment_index,
            } => write!(f, "comment/{post_index}/{comment_index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn counted_index() {
        assert_eq!(AccountLocator::State.index(), None);
        assert_eq!(AccountLocator::post(4).index(), Some(4));
        assert_eq!(AccountLocator::comment(4, 2).index(), Some(2));
    }

    #[test]
    fn tags_are_distinct() {
        let tags = [Namespace::State, Namespace::Post, Namespace::Comment].map(|n| n.tag());
        assert_ne!(tags[0], tags[1]);
        assert_ne!(tags[1], tags[2]);
        assert_ne!(tags[0], tags[2]);
    }

    #[test]
    fn namespace_parses_its_own_tag() {
        for ns in [Namespace::State, Namespace::Post, Namespace::Comment] {
            assert_eq!(ns.tag().parse::<Namespace>().unwrap(), ns);
        }
        assert!("like".parse::<Namespace>().is_err());
    }

    #[test]
    fn post_seeds_are_big_endian() {
        let seeds = AccountLocator::post(1).seeds();
        assert_eq!(seeds[0], b"post");
        assert_eq!(seeds[1], vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn comment_seeds_concatenate_post_then_comment() {
        let seeds = AccountLocator::comment(2, 5).seeds();
        assert_eq!(seeds.len(), 3);
        assert_eq!(seeds[1], 2u64.to_be_bytes().to_vec());
        assert_eq!(seeds[2], 5u64.to_be_bytes().to_vec());
    }

    #[test]
    fn counters_point_at_the_allocating_record() {
        assert_eq!(AccountLocator::State.counter(), None);
        assert_eq!(AccountLocator::post(3).counter(), Some(AccountLocator::State));
        assert_eq!(
            AccountLocator::comment(3, 0).counter(),
            Some(AccountLocator::post(3))
        );
    }

    #[test]
    fn display_is_path_like() {
        assert_eq!(AccountLocator::comment(1, 2).to_string(), "comment/1/2");
    }

    proptest! {
        #[test]
        fn seed_order_matches_numeric_order(a in any::<u64>(), b in any::<u64>()) {
            let sa = AccountLocator::post(a).seeds();
            let sb = AccountLocator::post(b).seeds();
            prop_assert_eq!(a.cmp(&b), sa[1].cmp(&sb[1]));
        }
    }
}
