use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use feed_crypto::{AddressDeriver, ContentHasher, CryptoError};
use feed_ledger::{
    CountedWrite, CounterScope, IdempotentWriter, Ledger, LikeOutcome, SequenceCounterStore,
    WriteError, WriteOutcome,
};
use feed_sync::{FeedSynchronizer, FeedView, SyncError, SyncHandle};
use feed_types::{
    AccountLocator, AccountPayload, Address, CommentDraft, CommentEntry, CommentPayload,
    ContentDigest, Identity, PostDraft, PostPayload,
};

use crate::config::SessionConfig;
use crate::error::{SdkError, SdkResult};
use crate::media::{MediaSource, MediaUploader};

/// Result of a post or comment create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub locator: AccountLocator,
    pub address: Address,
    /// `Bootstrapped` only when automatic resubmission is disabled; the entry
    /// was not written in that case.
    pub outcome: WriteOutcome,
    /// Whether this call had to create the state record first.
    pub bootstrapped: bool,
    /// Derivations tried by the final submission.
    pub attempts: u32,
}

impl WriteReceipt {
    pub fn index(&self) -> u64 {
        self.locator.index().unwrap_or_default()
    }

    pub fn is_written(&self) -> bool {
        self.outcome.is_created()
    }

    fn from_counted(counted: CountedWrite, bootstrapped: bool) -> Self {
        Self {
            locator: counted.target.locator,
            address: counted.target.address,
            outcome: counted.outcome,
            bootstrapped,
            attempts: counted.attempts,
        }
    }
}

/// Result of a media post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MediaReceipt {
    pub digest: ContentDigest,
    /// Upload failure message. The post is created regardless.
    pub upload_error: Option<String>,
    pub post: WriteReceipt,
}

/// One client's session against the feed.
///
/// Owns the write path (counter read, derivation, idempotent create) and
/// the background synchronizer. All methods take `&self`; share the session
/// behind an `Arc` to drive it from several tasks.
pub struct FeedSession {
    config: SessionConfig,
    identity: Identity,
    deriver: AddressDeriver,
    writer: IdempotentWriter,
    counters: SequenceCounterStore,
    sync: FeedSynchronizer,
    // Derive-then-write sequences for one counter never interleave within
    // a session. Other sessions are arbitrated by the ledger.
    post_lane: Mutex<()>,
    comment_lanes: std::sync::Mutex<HashMap<u64, Arc<Mutex<()>>>>,
    poller: Mutex<Option<SyncHandle>>,
}

impl FeedSession {
    /// Build a session. Fails when `config` does not validate.
    pub fn new(ledger: Arc<dyn Ledger>, identity: Identity, config: SessionConfig) -> SdkResult<Self> {
        config.validate()?;
        let deriver = AddressDeriver::new(config.program_id);
        Ok(Self {
            writer: IdempotentWriter::new(ledger.clone(), deriver, identity),
            counters: SequenceCounterStore::new(ledger.clone(), deriver)
                .with_retry_limit(config.write_retry_limit),
            sync: FeedSynchronizer::new(ledger, deriver),
            deriver,
            identity,
            config,
            post_lane: Mutex::new(()),
            comment_lanes: std::sync::Mutex::new(HashMap::new()),
            poller: Mutex::new(None),
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn synchronizer(&self) -> &FeedSynchronizer {
        &self.sync
    }

    // ---- Writes ----

    /// Create a post at the next free index.
    ///
    /// A missing state record is bootstrapped first. With
    /// `resubmit_after_bootstrap` the post is then submitted in the same
    /// call; otherwise the receipt says `Bootstrapped` and the caller
    /// resubmits.
    pub async fn create_post(&self, draft: PostDraft) -> SdkResult<WriteReceipt> {
        if draft.is_empty() {
            return Err(SdkError::EmptyPost);
        }
        let payload = AccountPayload::Post(PostPayload::from(self.post_profile(draft)));

        let _lane = self.post_lane.lock().await;
        let counted = self.create_counted(CounterScope::Posts, &payload).await?;
        if counted.outcome != WriteOutcome::Bootstrapped {
            return Ok(WriteReceipt::from_counted(counted, false));
        }
        if !self.config.resubmit_after_bootstrap {
            info!("state record bootstrapped, post left for the caller to resubmit");
            return Ok(WriteReceipt::from_counted(counted, true));
        }
        let counted = self.create_counted(CounterScope::Posts, &payload).await?;
        Ok(WriteReceipt::from_counted(counted, true))
    }

    /// Create a comment on the post at `post_index`.
    pub async fn create_comment(&self, post_index: u64, draft: CommentDraft) -> SdkResult<WriteReceipt> {
        let payload = AccountPayload::Comment {
            post_index,
            payload: CommentPayload::from(self.comment_profile(draft)),
        };

        let lane = self.comment_lane(post_index);
        let guard = lane.lock().await;
        let counted = self
            .create_counted(CounterScope::Comments { post_index }, &payload)
            .await;
        drop(guard);
        self.release_comment_lane(post_index, lane);
        Ok(WriteReceipt::from_counted(counted?, false))
    }

    pub async fn like_post(&self, post_index: u64) -> SdkResult<LikeOutcome> {
        self.retrying("like post", WriteError::is_retryable, move || {
            self.writer.like_post(post_index)
        })
        .await
    }

    // ---- Media ----

    /// Stream `source` through the content hasher.
    pub async fn hash_media(&self, source: &dyn MediaSource) -> SdkResult<ContentDigest> {
        let io_err = |e| CryptoError::HashIo {
            bytes_read: 0,
            source: e,
        };
        let expected = source.len_hint().await.map_err(io_err)?;
        let reader = source.open().await.map_err(io_err)?;
        let digest = ContentHasher::hash_reader_expecting(reader, expected).await?;
        Ok(digest)
    }

    /// Hash, upload, then post the digest.
    ///
    /// A hashing failure aborts before anything leaves the client. An upload
    /// failure is logged and reported in the receipt but still posts: the
    /// digest is what the ledger records.
    pub async fn post_media(
        &self,
        source: &dyn MediaSource,
        uploader: &dyn MediaUploader,
    ) -> SdkResult<MediaReceipt> {
        let digest = self.hash_media(source).await?;

        let upload_error = match uploader.upload(&digest, source).await {
            Ok(()) => {
                info!(digest = %digest.short_hex(), source = %source.describe(), "media uploaded");
                None
            }
            Err(e) => {
                warn!(digest = %digest.short_hex(), error = %e, "media upload failed, posting digest anyway");
                Some(e.to_string())
            }
        };

        let post = self.create_post(PostDraft::media(digest)).await?;
        Ok(MediaReceipt {
            digest,
            upload_error,
            post,
        })
    }

    // ---- Reads ----

    /// Comments of one post, oldest first.
    pub async fn fetch_comments(&self, post_index: u64) -> SdkResult<Vec<CommentEntry>> {
        self.retrying("fetch comments", SyncError::is_transient, move || {
            self.sync.fetch_comments(post_index)
        })
        .await
    }

    /// Poll once now, outside the regular schedule.
    pub async fn refresh_now(&self) -> SdkResult<Arc<FeedView>> {
        Ok(self.sync.sync_once().await?)
    }

    pub fn current_view(&self) -> Arc<FeedView> {
        self.sync.current_view()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedView>> {
        self.sync.subscribe()
    }

    pub fn on_view_updated<F>(&self, callback: F)
    where
        F: Fn(&FeedView) + Send + Sync + 'static,
    {
        self.sync.on_view_updated(callback);
    }

    // ---- Lifecycle ----

    /// Start background polling at the configured interval. No-op when
    /// already running.
    pub async fn start(&self) {
        let mut poller = self.poller.lock().await;
        if poller.as_ref().is_some_and(SyncHandle::is_running) {
            return;
        }
        *poller = Some(self.sync.start(self.config.poll_interval()));
    }

    /// Stop background polling and wait for the loop to exit. In-flight
    /// ledger writes are not affected.
    pub async fn stop(&self) {
        if let Some(handle) = self.poller.lock().await.take() {
            handle.stop().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(SyncHandle::is_running)
    }

    // ---- Internals ----

    async fn create_counted(
        &self,
        scope: CounterScope,
        payload: &AccountPayload,
    ) -> SdkResult<CountedWrite> {
        self.retrying("create entry", WriteError::is_retryable, move || {
            self.counters
                .create_next(&self.writer, scope, move || payload.clone())
        })
        .await
    }

    async fn retrying<T, E, F, Fut>(
        &self,
        what: &str,
        is_transient: fn(&E) -> bool,
        mut op: F,
    ) -> SdkResult<T>
    where
        E: Into<SdkError> + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let policy = &self.config.transient_retry;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if is_transient(&e) && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient ledger failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other.map_err(Into::into),
            }
        }
    }

    fn comment_lane(&self, post_index: u64) -> Arc<Mutex<()>> {
        self.comment_lanes
            .lock()
            .expect("lock poisoned")
            .entry(post_index)
            .or_default()
            .clone()
    }

    // Drops the lane once no other caller holds or awaits it.
    fn release_comment_lane(&self, post_index: u64, lane: Arc<Mutex<()>>) {
        let mut lanes = self.comment_lanes.lock().expect("lock poisoned");
        if Arc::strong_count(&lane) == 2 {
            lanes.remove(&post_index);
        }
    }

    #[cfg(test)]
    fn comment_lane_count(&self) -> usize {
        self.comment_lanes.lock().expect("lock poisoned").len()
    }

    fn post_profile(&self, mut draft: PostDraft) -> PostDraft {
        fill_blank(&mut draft.display_name, &self.config.display_name);
        fill_blank(&mut draft.source_url, &self.config.profile_url);
        draft
    }

    fn comment_profile(&self, mut draft: CommentDraft) -> CommentDraft {
        fill_blank(&mut draft.display_name, &self.config.display_name);
        fill_blank(&mut draft.source_url, &self.config.profile_url);
        draft
    }
}

/// An empty string counts as unset, as it does for payload defaults.
fn fill_blank(field: &mut Option<String>, fallback: &str) {
    if field.as_deref().map_or(true, str::is_empty) {
        *field = Some(fallback.to_string());
    }
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession")
            .field("identity", &self.identity)
            .field("program_id", &self.config.program_id.to_hex())
            .field("sync", &self.sync)
            .finish()
    }
}
