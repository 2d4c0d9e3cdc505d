use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use feed_crypto::{AddressDeriver, DerivedAddress};
use feed_types::{Account, AccountLocator, AccountPayload};

use crate::error::{WriteError, WriteResult};
use crate::traits::Ledger;
use crate::writer::{IdempotentWriter, WriteOutcome};

/// Attempts before a lost race is reported as a conflict.
pub const DEFAULT_WRITE_RETRY_LIMIT: u32 = 3;

/// A counter-allocated namespace instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterScope {
    /// The global post counter held by the state record.
    Posts,
    /// The comment counter held by one post.
    Comments { post_index: u64 },
}

impl CounterScope {
    /// The record that holds this counter.
    pub fn record(&self) -> AccountLocator {
        match *self {
            Self::Posts => AccountLocator::State,
            Self::Comments { post_index } => AccountLocator::post(post_index),
        }
    }

    /// The entry allocated at `index` in this scope.
    pub fn entry(&self, index: u64) -> AccountLocator {
        match *self {
            Self::Posts => AccountLocator::post(index),
            Self::Comments { post_index } => AccountLocator::comment(post_index, index),
        }
    }
}

impl fmt::Display for CounterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posts => write!(f, "posts"),
            Self::Comments { post_index } => write!(f, "comments of post {post_index}"),
        }
    }
}

/// A successful counter-allocated write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountedWrite {
    /// `Created` or `Bootstrapped`; never `AlreadyExists`.
    pub outcome: WriteOutcome,
    /// Where the entry was (or, after a bootstrap, would have been) written.
    pub target: DerivedAddress,
    /// Derivations tried, including the successful one.
    pub attempts: u32,
}

/// Reads ledger-resident counters and turns them into write targets.
///
/// The client never writes a counter. It reads the current value right
/// before each derivation, since any other writer may have advanced it.
pub struct SequenceCounterStore {
    ledger: Arc<dyn Ledger>,
    deriver: AddressDeriver,
    retry_limit: u32,
}

impl SequenceCounterStore {
    pub fn new(ledger: Arc<dyn Ledger>, deriver: AddressDeriver) -> Self {
        Self {
            ledger,
            deriver,
            retry_limit: DEFAULT_WRITE_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit.max(1);
        self
    }

    /// Current value of a counter, or `None` if its record does not exist.
    pub async fn current_count(&self, scope: CounterScope) -> WriteResult<Option<u64>> {
        let record = self.deriver.derive(&scope.record())?;
        let account = self
            .ledger
            .fetch_account(&record.address)
            .await
            .map_err(WriteError::TransientRead)?;
        let count = match account {
            Some(Account::State(state)) if scope == CounterScope::Posts => Some(state.post_count),
            Some(Account::Post(post)) if matches!(scope, CounterScope::Comments { .. }) => {
                Some(post.comment_count)
            }
            Some(other) => {
                return Err(WriteError::Rejected {
                    reason: format!("{} holds a {:?} account", scope.record(), other.kind()),
                })
            }
            None => None,
        };
        debug!(%scope, ?count, "counter read");
        Ok(count)
    }

    /// Allocate the next index in `scope` and create the entry there.
    ///
    /// Each attempt re-reads the counter, derives the target and hands it to
    /// the writer. `AlreadyExists` means another writer took that index, so
    /// the loop tries again with the advanced counter, up to the retry limit.
    pub async fn create_next<F>(
        &self,
        writer: &IdempotentWriter,
        scope: CounterScope,
        build: F,
    ) -> WriteResult<CountedWrite>
    where
        F: Fn() -> AccountPayload + Send + Sync,
    {
        for attempt in 1..=self.retry_limit {
            let count = match self.current_count(scope).await? {
                Some(count) => count,
                // The writer bootstraps a missing state record.
                None if scope == CounterScope::Posts => 0,
                None => {
                    return Err(WriteError::ParentMissing {
                        locator: scope.record().to_string(),
                    })
                }
            };

            let target = self.deriver.derive(&scope.entry(count))?;
            match writer.create_if_absent(&target, &build).await? {
                WriteOutcome::AlreadyExists => {
                    warn!(%scope, index = count, attempt, "index taken by another writer, re-deriving");
                }
                outcome => {
                    return Ok(CountedWrite {
                        outcome,
                        target,
                        attempts: attempt,
                    })
                }
            }
        }

        Err(WriteError::ConcurrentWriteConflict {
            scope: scope.to_string(),
            attempts: self.retry_limit,
        })
    }
}
