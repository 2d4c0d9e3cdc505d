use async_trait::async_trait;

use feed_types::{Account, AccountKind, AccountPayload, Address, Identity, LedgerEntry};

use crate::error::LedgerResult;

/// The remote ledger program, seen from the client.
///
/// Implementations may be slow or unavailable at any time. A missing account
/// is `Ok(None)`, never an error; errors are reserved for failures that say
/// nothing about existence.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch one account by address.
    async fn fetch_account(&self, address: &Address) -> LedgerResult<Option<Account>>;

    /// Fetch several accounts, positionally.
    ///
    /// Default implementation calls `fetch_account()` for each address.
    /// Backends may override for fewer round-trips.
    async fn fetch_multiple(&self, addresses: &[Address]) -> LedgerResult<Vec<Option<Account>>> {
        let mut out = Vec::with_capacity(addresses.len());
        for address in addresses {
            out.push(self.fetch_account(address).await?);
        }
        Ok(out)
    }

    /// Fetch every account of one kind, in no particular order.
    async fn fetch_all_of_kind(&self, kind: AccountKind) -> LedgerResult<Vec<LedgerEntry>>;

    /// Create an account at `address`, signed by `authority`.
    ///
    /// Creates that allocate from a counter (posts, comments) advance that
    /// counter atomically with the create.
    async fn create_account(
        &self,
        address: &Address,
        payload: &AccountPayload,
        authority: &Identity,
    ) -> LedgerResult<()>;

    /// Record a like on the post at `address`.
    async fn like_post(&self, address: &Address, liker: &Identity) -> LedgerResult<()>;
}
