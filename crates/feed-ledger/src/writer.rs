use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use feed_crypto::{AddressDeriver, DerivedAddress};
use feed_types::{AccountLocator, AccountPayload, Identity, PostAccount};

use crate::error::{LedgerError, WriteError, WriteResult};
use crate::traits::Ledger;

/// Result of an idempotent create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// This call created the entry.
    Created,
    /// The entry was already there, or a racing writer won. Not an error.
    AlreadyExists,
    /// The global state record was missing and has now been created. The
    /// requested entry was NOT written; resubmit to create it.
    Bootstrapped,
}

impl WriteOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    Liked,
    AlreadyLiked,
}

/// Check-before-create writer.
///
/// Reads the target first and only submits a create when the read says
/// "not found". A create that loses a race at the ledger is reported as
/// [`WriteOutcome::AlreadyExists`], so duplicate submissions from any
/// number of clients leave exactly one entry behind.
pub struct IdempotentWriter {
    ledger: Arc<dyn Ledger>,
    deriver: AddressDeriver,
    authority: Identity,
}

impl IdempotentWriter {
    pub fn new(ledger: Arc<dyn Ledger>, deriver: AddressDeriver, authority: Identity) -> Self {
        Self {
            ledger,
            deriver,
            authority,
        }
    }

    pub fn authority(&self) -> &Identity {
        &self.authority
    }

    /// Create the entry at `target` unless something already lives there.
    ///
    /// `build` is only invoked when a create is actually submitted. For
    /// posts, a missing state record is created first and the call returns
    /// [`WriteOutcome::Bootstrapped`] without touching the post address.
    pub async fn create_if_absent<F>(
        &self,
        target: &DerivedAddress,
        build: F,
    ) -> WriteResult<WriteOutcome>
    where
        F: FnOnce() -> AccountPayload + Send,
    {
        let locator = target.locator;

        if self.read(target).await?.is_some() {
            debug!(%locator, address = %target.address.short_hex(), "entry exists, skipping create");
            return Ok(WriteOutcome::AlreadyExists);
        }

        match locator.counter() {
            Some(AccountLocator::State) => {
                let state = self.deriver.state()?;
                if self.read(&state).await?.is_none() {
                    return self.bootstrap(&state).await;
                }
            }
            Some(parent) => {
                let parent = self.deriver.derive(&parent)?;
                if self.read(&parent).await?.is_none() {
                    return Err(WriteError::ParentMissing {
                        locator: parent.locator.to_string(),
                    });
                }
            }
            None => {}
        }

        self.submit(target, &build()).await
    }

    /// Create the global state record (post counter = 0) if it is missing.
    pub async fn ensure_state(&self) -> WriteResult<WriteOutcome> {
        let state = self.deriver.state()?;
        if self.read(&state).await?.is_some() {
            return Ok(WriteOutcome::AlreadyExists);
        }
        self.bootstrap(&state).await
    }

    /// Like the post at `index` on behalf of this writer's authority.
    ///
    /// Checks the liker set first; a like that is already recorded, here or
    /// by a racing submission, is [`LikeOutcome::AlreadyLiked`].
    pub async fn like_post(&self, index: u64) -> WriteResult<LikeOutcome> {
        let target = self.deriver.post(index)?;
        let post = match self.read(&target).await? {
            Some(account) => account.as_post().cloned(),
            None => None,
        };
        let post: PostAccount = post.ok_or_else(|| WriteError::ParentMissing {
            locator: target.locator.to_string(),
        })?;

        if post.is_liked_by(&self.authority) {
            debug!(index, "post already liked");
            return Ok(LikeOutcome::AlreadyLiked);
        }

        match self.ledger.like_post(&target.address, &self.authority).await {
            Ok(()) => {
                info!(index, "post liked");
                Ok(LikeOutcome::Liked)
            }
            Err(LedgerError::AlreadyLiked) => Ok(LikeOutcome::AlreadyLiked),
            Err(e) => Err(WriteError::Rejected {
                reason: e.to_string(),
            }),
        }
    }

    async fn bootstrap(&self, state: &DerivedAddress) -> WriteResult<WriteOutcome> {
        info!(address = %state.address.short_hex(), "state record missing, bootstrapping");
        match self.submit(state, &AccountPayload::State).await? {
            WriteOutcome::Created | WriteOutcome::AlreadyExists => Ok(WriteOutcome::Bootstrapped),
            WriteOutcome::Bootstrapped => Ok(WriteOutcome::Bootstrapped),
        }
    }

    async fn read(&self, target: &DerivedAddress) -> WriteResult<Option<feed_types::Account>> {
        self.ledger
            .fetch_account(&target.address)
            .await
            .map_err(|e| {
                warn!(locator = %target.locator, error = %e, "ledger read failed");
                WriteError::TransientRead(e)
            })
    }

    async fn submit(
        &self,
        target: &DerivedAddress,
        payload: &AccountPayload,
    ) -> WriteResult<WriteOutcome> {
        match self
            .ledger
            .create_account(&target.address, payload, &self.authority)
            .await
        {
            Ok(()) => {
                info!(locator = %target.locator, address = %target.address.short_hex(), "entry created");
                Ok(WriteOutcome::Created)
            }
            Err(LedgerError::AccountInUse { .. }) => {
                debug!(locator = %target.locator, "lost create race");
                Ok(WriteOutcome::AlreadyExists)
            }
            Err(e) => {
                warn!(locator = %target.locator, error = %e, "create rejected");
                Err(WriteError::Rejected {
                    reason: e.to_string(),
                })
            }
        }
    }
}
