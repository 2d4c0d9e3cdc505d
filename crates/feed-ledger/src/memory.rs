//! In-memory ledger for tests, demos and simulation.
//!
//! [`InMemoryLedger`] enforces the same rules the on-chain program does for
//! the feed: addresses must be the derivation of the current counter, an
//! occupied address cannot be created twice, and counters advance in the
//! same critical section as the create they count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use feed_crypto::AddressDeriver;
use feed_types::{
    Account, AccountKind, AccountLocator, AccountPayload, Address, CommentAccount, Identity,
    LedgerEntry, PostAccount, ProgramId, StateAccount,
};

use crate::error::{LedgerError, LedgerResult};
use crate::traits::Ledger;

/// Source of `post_time` values.
#[derive(Debug)]
pub enum LedgerClock {
    /// Wall-clock unix seconds.
    System,
    /// Test clock, moved explicitly.
    Manual(AtomicI64),
}

impl LedgerClock {
    pub fn manual(start: i64) -> Self {
        Self::Manual(AtomicI64::new(start))
    }

    pub fn now(&self) -> i64 {
        match self {
            Self::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            Self::Manual(t) => t.load(Ordering::SeqCst),
        }
    }
}

/// In-memory ledger keyed by derived address.
pub struct InMemoryLedger {
    deriver: AddressDeriver,
    clock: LedgerClock,
    accounts: RwLock<HashMap<Address, Account>>,
    offline: AtomicBool,
    failures_pending: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(program_id: ProgramId) -> Self {
        Self::with_clock(program_id, LedgerClock::System)
    }

    pub fn with_clock(program_id: ProgramId, clock: LedgerClock) -> Self {
        Self {
            deriver: AddressDeriver::new(program_id),
            clock,
            accounts: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            failures_pending: AtomicUsize::new(0),
        }
    }

    pub fn program_id(&self) -> &ProgramId {
        self.deriver.program_id()
    }

    /// Move a manual clock forward. No-op on the system clock.
    pub fn advance_clock(&self, secs: i64) {
        if let LedgerClock::Manual(t) = &self.clock {
            t.fetch_add(secs, Ordering::SeqCst);
        }
    }

    /// While offline every operation fails with [`LedgerError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `n` operations fail with [`LedgerError::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Number of accounts of the given kind.
    pub fn count_of_kind(&self, kind: AccountKind) -> usize {
        self.accounts
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|a| a.kind() == kind)
            .count()
    }

    /// Total number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> LedgerResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".into()));
        }
        let consumed = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(LedgerError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn expected(&self, locator: AccountLocator) -> LedgerResult<Address> {
        self.deriver
            .derive(&locator)
            .map(|d| d.address)
            .map_err(|e| LedgerError::rejected(e.to_string()))
    }

    fn create_locked(
        &self,
        accounts: &mut HashMap<Address, Account>,
        address: &Address,
        payload: &AccountPayload,
        authority: &Identity,
    ) -> LedgerResult<AccountLocator> {
        if accounts.contains_key(address) {
            return Err(LedgerError::AccountInUse {
                address: address.to_hex(),
            });
        }

        match payload {
            AccountPayload::State => {
                if *address != self.expected(AccountLocator::State)? {
                    return Err(LedgerError::rejected("state address mismatch"));
                }
                accounts.insert(
                    *address,
                    Account::State(StateAccount {
                        authority: Some(*authority),
                        post_count: 0,
                    }),
                );
                Ok(AccountLocator::State)
            }
            AccountPayload::Post(post) => {
                let state_address = self.expected(AccountLocator::State)?;
                let index = match accounts.get(&state_address) {
                    Some(Account::State(state)) => state.post_count,
                    _ => return Err(LedgerError::rejected("state account not initialized")),
                };
                let locator = AccountLocator::post(index);
                if *address != self.expected(locator)? {
                    return Err(LedgerError::rejected(format!(
                        "post address does not match counter {index}"
                    )));
                }
                accounts.insert(
                    *address,
                    Account::Post(PostAccount {
                        index,
                        author: *authority,
                        display_name: post.display_name.clone(),
                        source_url: post.source_url.clone(),
                        text: post.text.clone(),
                        content_hash: post.content_hash,
                        post_time: self.clock.now(),
                        like_count: 0,
                        likers: Vec::new(),
                        comment_count: 0,
                    }),
                );
                if let Some(Account::State(state)) = accounts.get_mut(&state_address) {
                    state.post_count += 1;
                }
                Ok(locator)
            }
            AccountPayload::Comment {
                post_index,
                payload,
            } => {
                let post_address = self.expected(AccountLocator::post(*post_index))?;
                let comment_index = match accounts.get(&post_address) {
                    Some(Account::Post(post)) => post.comment_count,
                    _ => {
                        return Err(LedgerError::rejected(format!(
                            "post {post_index} does not exist"
                        )))
                    }
                };
                let locator = AccountLocator::comment(*post_index, comment_index);
                if *address != self.expected(locator)? {
                    return Err(LedgerError::rejected(format!(
                        "comment address does not match counter {comment_index}"
                    )));
                }
                accounts.insert(
                    *address,
                    Account::Comment(CommentAccount {
                        post_index: *post_index,
                        comment_index,
                        author: *authority,
                        display_name: payload.display_name.clone(),
                        source_url: payload.source_url.clone(),
                        text: payload.text.clone(),
                        post_time: self.clock.now(),
                    }),
                );
                if let Some(Account::Post(post)) = accounts.get_mut(&post_address) {
                    post.comment_count += 1;
                }
                Ok(locator)
            }
        }
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("program_id", self.program_id())
            .field("account_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn fetch_account(&self, address: &Address) -> LedgerResult<Option<Account>> {
        self.check_available()?;
        let accounts = self.accounts.read().expect("lock poisoned");
        Ok(accounts.get(address).cloned())
    }

    async fn fetch_all_of_kind(&self, kind: AccountKind) -> LedgerResult<Vec<LedgerEntry>> {
        self.check_available()?;
        let accounts = self.accounts.read().expect("lock poisoned");
        Ok(accounts
            .iter()
            .filter(|(_, account)| account.kind() == kind)
            .map(|(address, account)| LedgerEntry {
                address: *address,
                account: account.clone(),
            })
            .collect())
    }

    async fn create_account(
        &self,
        address: &Address,
        payload: &AccountPayload,
        authority: &Identity,
    ) -> LedgerResult<()> {
        self.check_available()?;
        let mut accounts = self.accounts.write().expect("lock poisoned");
        let locator = self.create_locked(&mut accounts, address, payload, authority)?;
        debug!(%locator, address = %address.short_hex(), "ledger account created");
        Ok(())
    }

    async fn like_post(&self, address: &Address, liker: &Identity) -> LedgerResult<()> {
        self.check_available()?;
        let mut accounts = self.accounts.write().expect("lock poisoned");
        match accounts.get_mut(address) {
            Some(Account::Post(post)) => {
                if post.is_liked_by(liker) {
                    return Err(LedgerError::AlreadyLiked);
                }
                post.likers.push(*liker);
                post.like_count += 1;
                Ok(())
            }
            Some(_) => Err(LedgerError::rejected("account is not a post")),
            None => Err(LedgerError::rejected("post not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_types::{CommentDraft, CommentPayload, PostDraft, PostPayload};

    fn program() -> ProgramId {
        ProgramId::from_bytes([5; 32])
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::with_clock(program(), LedgerClock::manual(1_000))
    }

    fn deriver() -> AddressDeriver {
        AddressDeriver::new(program())
    }

    fn post_payload(text: &str) -> AccountPayload {
        AccountPayload::Post(PostPayload::from(PostDraft::text(text)))
    }

    fn comment_payload(post_index: u64, text: &str) -> AccountPayload {
        AccountPayload::Comment {
            post_index,
            payload: CommentPayload::from(CommentDraft::text(text)),
        }
    }

    async fn init_state(ledger: &InMemoryLedger, who: &Identity) {
        let state = deriver().state().unwrap().address;
        ledger
            .create_account(&state, &AccountPayload::State, who)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_requires_state() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        let addr = deriver().post(0).unwrap().address;
        let err = ledger
            .create_account(&addr, &post_payload("hi"), &who)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
    }

    #[tokio::test]
    async fn post_create_advances_counter() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;

        let addr = deriver().post(0).unwrap().address;
        ledger
            .create_account(&addr, &post_payload("first"), &who)
            .await
            .unwrap();

        let state = ledger
            .fetch_account(&deriver().state().unwrap().address)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.as_state().unwrap().post_count, 1);

        let post = ledger.fetch_account(&addr).await.unwrap().unwrap();
        let post = post.as_post().unwrap();
        assert_eq!(post.index, 0);
        assert_eq!(post.author, who);
        assert_eq!(post.post_time, 1_000);
    }

    #[tokio::test]
    async fn occupied_address_is_in_use() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;
        let addr = deriver().post(0).unwrap().address;
        ledger
            .create_account(&addr, &post_payload("a"), &who)
            .await
            .unwrap();
        let err = ledger
            .create_account(&addr, &post_payload("b"), &who)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountInUse { .. }));
        assert_eq!(ledger.count_of_kind(AccountKind::Post), 1);
    }

    #[tokio::test]
    async fn post_at_stale_index_is_rejected() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;
        let addr = deriver().post(5).unwrap().address;
        let err = ledger
            .create_account(&addr, &post_payload("skip"), &who)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
    }

    #[tokio::test]
    async fn comment_advances_post_counter() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;
        let post_addr = deriver().post(0).unwrap().address;
        ledger
            .create_account(&post_addr, &post_payload("p"), &who)
            .await
            .unwrap();

        for i in 0..2 {
            let addr = deriver().comment(0, i).unwrap().address;
            ledger
                .create_account(&addr, &comment_payload(0, "c"), &who)
                .await
                .unwrap();
        }

        let post = ledger.fetch_account(&post_addr).await.unwrap().unwrap();
        assert_eq!(post.as_post().unwrap().comment_count, 2);
        assert_eq!(ledger.count_of_kind(AccountKind::Comment), 2);
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_rejected() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;
        let addr = deriver().comment(9, 0).unwrap().address;
        assert!(matches!(
            ledger.create_account(&addr, &comment_payload(9, "c"), &who).await,
            Err(LedgerError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn like_is_once_per_identity() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;
        let addr = deriver().post(0).unwrap().address;
        ledger
            .create_account(&addr, &post_payload("p"), &who)
            .await
            .unwrap();

        ledger.like_post(&addr, &who).await.unwrap();
        assert_eq!(
            ledger.like_post(&addr, &who).await.unwrap_err(),
            LedgerError::AlreadyLiked
        );
        let post = ledger.fetch_account(&addr).await.unwrap().unwrap();
        assert_eq!(post.as_post().unwrap().like_count, 1);
    }

    #[tokio::test]
    async fn offline_ledger_is_unavailable() {
        let ledger = ledger();
        ledger.set_offline(true);
        let err = ledger.fetch_all_of_kind(AccountKind::Post).await.unwrap_err();
        assert!(err.is_transient());
        ledger.set_offline(false);
        assert!(ledger.fetch_all_of_kind(AccountKind::Post).await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let ledger = ledger();
        ledger.fail_next(2);
        let addr = Address::from_bytes([0; 32]);
        assert!(ledger.fetch_account(&addr).await.is_err());
        assert!(ledger.fetch_account(&addr).await.is_err());
        assert_eq!(ledger.fetch_account(&addr).await.unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_multiple_is_positional() {
        let ledger = ledger();
        let who = Identity::ephemeral();
        init_state(&ledger, &who).await;
        let state = deriver().state().unwrap().address;
        let missing = deriver().post(0).unwrap().address;
        let got = ledger.fetch_multiple(&[missing, state]).await.unwrap();
        assert!(got[0].is_none());
        assert!(got[1].as_ref().unwrap().as_state().is_some());
    }

    #[test]
    fn manual_clock_advances() {
        let ledger = ledger();
        ledger.advance_clock(5);
        assert_eq!(ledger.clock.now(), 1_005);
    }
}
