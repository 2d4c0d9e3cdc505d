use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feed_crypto::AddressDeriver;
use feed_ledger::Ledger;
use feed_types::{AccountKind, CommentEntry, PostEntry};

use crate::comments::fetch_comments;
use crate::error::{SyncError, SyncResult};
use crate::view::FeedView;

/// Poll period used when the session configuration does not set one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest period the poll loop runs at. Shorter requests are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Where the synchronizer is within a polling cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    MergedOk,
    FetchFailed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::MergedOk => "merged",
            Self::FetchFailed => "fetch-failed",
        };
        f.write_str(s)
    }
}

/// Counters for diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub ticks: u64,
    pub merges: u64,
    pub failures: u64,
    /// Outcome of the most recent cycle, `None` before the first one.
    pub last_result: Option<SyncPhase>,
    pub last_error: Option<String>,
}

type ViewCallback = Arc<dyn Fn(&FeedView) + Send + Sync>;

struct Shared {
    ledger: Arc<dyn Ledger>,
    deriver: AddressDeriver,
    view: watch::Sender<Arc<FeedView>>,
    callbacks: RwLock<Vec<ViewCallback>>,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    // One cycle at a time, so generations and change flags line up.
    cycle: Mutex<()>,
}

/// Pulls posts from the ledger and publishes ordered snapshots.
///
/// Cheap to clone; clones share the published view.
#[derive(Clone)]
pub struct FeedSynchronizer {
    shared: Arc<Shared>,
}

impl FeedSynchronizer {
    pub fn new(ledger: Arc<dyn Ledger>, deriver: AddressDeriver) -> Self {
        let (view, _) = watch::channel(Arc::new(FeedView::empty()));
        Self {
            shared: Arc::new(Shared {
                ledger,
                deriver,
                view,
                callbacks: RwLock::new(Vec::new()),
                phase: RwLock::new(SyncPhase::Idle),
                stats: RwLock::new(SyncStats::default()),
                cycle: Mutex::new(()),
            }),
        }
    }

    /// The last published snapshot. Empty before the first successful fetch.
    pub fn current_view(&self) -> Arc<FeedView> {
        self.shared.view.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedView>> {
        self.shared.view.subscribe()
    }

    /// Run `callback` after each successful poll with the new snapshot.
    ///
    /// Callbacks run outside the registry lock and may register others;
    /// those take effect from the next poll.
    pub fn on_view_updated<F>(&self, callback: F)
    where
        F: Fn(&FeedView) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .write()
            .expect("lock poisoned")
            .push(Arc::new(callback));
    }

    pub fn phase(&self) -> SyncPhase {
        *self.shared.phase.read().expect("lock poisoned")
    }

    pub fn stats(&self) -> SyncStats {
        self.shared.stats.read().expect("lock poisoned").clone()
    }

    /// Run one polling cycle now.
    ///
    /// On failure the previous snapshot stays published and the error is
    /// returned to the caller.
    pub async fn sync_once(&self) -> SyncResult<Arc<FeedView>> {
        self.cycle(None).await
    }

    /// Fetch the comments of one post, oldest first.
    pub async fn fetch_comments(&self, post_index: u64) -> SyncResult<Vec<CommentEntry>> {
        fetch_comments(self.shared.ledger.as_ref(), &self.shared.deriver, post_index).await
    }

    /// Start polling every `interval`, beginning immediately. Intervals
    /// below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn start(&self, interval: Duration) -> SyncHandle {
        if interval < MIN_POLL_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "poll interval too short, using minimum"
            );
        }
        let interval = interval.max(MIN_POLL_INTERVAL);
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let this = self.clone();
            let cancel = cancel.clone();
            async move { this.run(interval, cancel).await }
        });
        info!(interval_ms = interval.as_millis() as u64, "feed sync started");
        SyncHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                // Failures are already logged and counted.
                _ = self.cycle(Some(&cancel)) => {}
            }
        }
        debug!("feed sync loop exited");
    }

    async fn cycle(&self, cancel: Option<&CancellationToken>) -> SyncResult<Arc<FeedView>> {
        let _guard = self.shared.cycle.lock().await;
        // Back to Idle however the cycle ends, including when it is dropped
        // mid-fetch by a stopping loop.
        let _idle = IdleOnExit(&self.shared);
        self.set_phase(SyncPhase::Fetching);

        let fetched = self
            .shared
            .ledger
            .fetch_all_of_kind(AccountKind::Post)
            .await;
        self.update_stats(|s| s.ticks += 1);

        let entries = match fetched {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "feed fetch failed, keeping previous view");
                self.update_stats(|s| {
                    s.failures += 1;
                    s.last_result = Some(SyncPhase::FetchFailed);
                    s.last_error = Some(e.to_string());
                });
                self.set_phase(SyncPhase::FetchFailed);
                return Err(SyncError::FetchFailed(e));
            }
        };

        let posts: Vec<PostEntry> = entries
            .into_iter()
            .filter_map(|entry| PostEntry::try_from(entry).ok())
            .collect();

        // A stopped loop must not publish.
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Ok(self.current_view());
        }

        let previous = self.current_view();
        let view = Arc::new(FeedView::next(posts, &previous));
        self.shared.view.send_replace(view.clone());

        self.update_stats(|s| {
            s.merges += 1;
            s.last_result = Some(SyncPhase::MergedOk);
            s.last_error = None;
        });
        self.set_phase(SyncPhase::MergedOk);
        if view.changed() {
            info!(posts = view.len(), generation = view.generation(), "posts refreshed");
        } else {
            debug!(posts = view.len(), generation = view.generation(), "feed unchanged");
        }

        let callbacks: Vec<ViewCallback> = self
            .shared
            .callbacks
            .read()
            .expect("lock poisoned")
            .clone();
        for callback in callbacks {
            callback(&view);
        }
        Ok(view)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.shared.set_phase(phase);
    }

    fn update_stats(&self, f: impl FnOnce(&mut SyncStats)) {
        f(&mut self.shared.stats.write().expect("lock poisoned"));
    }
}

impl Shared {
    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write().expect("lock poisoned") = phase;
    }
}

struct IdleOnExit<'a>(&'a Shared);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_phase(SyncPhase::Idle);
    }
}

impl fmt::Debug for FeedSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSynchronizer")
            .field("phase", &self.phase())
            .field("posts", &self.current_view().len())
            .finish()
    }
}

/// Running poll loop. Dropping the handle cancels the loop; [`stop`]
/// additionally waits for it to exit.
///
/// [`stop`]: SyncHandle::stop
pub struct SyncHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Cancel the loop and wait for it. Once this returns the loop will
    /// not publish again.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "feed sync task ended abnormally");
            }
        }
        info!("feed sync stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use feed_ledger::{IdempotentWriter, InMemoryLedger, LedgerClock, LedgerResult};
    use feed_types::{
        Account, AccountPayload, Address, Identity, LedgerEntry, PostDraft, ProgramId,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        deriver: AddressDeriver,
        writer: IdempotentWriter,
        sync: FeedSynchronizer,
    }

    fn fixture() -> Fixture {
        let program = ProgramId::from_bytes([6; 32]);
        let ledger = Arc::new(InMemoryLedger::with_clock(program, LedgerClock::manual(1_000)));
        let deriver = AddressDeriver::new(program);
        Fixture {
            writer: IdempotentWriter::new(ledger.clone(), deriver, Identity::ephemeral()),
            sync: FeedSynchronizer::new(ledger.clone(), deriver),
            ledger,
            deriver,
        }
    }

    impl Fixture {
        async fn post(&self, index: u64, text: &str) {
            self.ledger.advance_clock(1);
            let target = self.deriver.post(index).unwrap();
            let outcome = self
                .writer
                .create_if_absent(&target, || AccountPayload::Post(PostDraft::text(text).into()))
                .await
                .unwrap();
            assert!(outcome.is_created());
        }
    }

    #[tokio::test]
    async fn view_is_empty_before_first_fetch() {
        let f = fixture();
        assert!(f.sync.current_view().is_empty());
        assert_eq!(f.sync.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn first_post_shows_up_on_next_poll() {
        let f = fixture();
        f.writer.ensure_state().await.unwrap();
        f.post(0, "hello").await;

        let view = f.sync.sync_once().await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.posts()[0].post.text, "hello");
        assert!(view.changed());
        assert_eq!(f.sync.stats().merges, 1);
        assert_eq!(f.sync.stats().last_result, Some(SyncPhase::MergedOk));
    }

    #[tokio::test]
    async fn view_is_newest_first() {
        let f = fixture();
        f.writer.ensure_state().await.unwrap();
        for i in 0..4 {
            f.post(i, &format!("post {i}")).await;
        }
        let view = f.sync.sync_once().await.unwrap();
        let order: Vec<u64> = view.posts().iter().map(|e| e.post.index).collect();
        assert_eq!(order, vec![3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_view() {
        let f = fixture();
        f.writer.ensure_state().await.unwrap();
        f.post(0, "kept").await;
        let before = f.sync.sync_once().await.unwrap();

        f.ledger.fail_next(1);
        let err = f.sync.sync_once().await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed(_)));
        assert_eq!(f.sync.current_view(), before);

        let stats = f.sync.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.last_result, Some(SyncPhase::FetchFailed));
        assert!(stats.last_error.is_some());
        assert_eq!(f.sync.phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn callbacks_see_each_snapshot() {
        let f = fixture();
        let seen = Arc::new(AtomicUsize::new(0));
        f.sync.on_view_updated({
            let seen = seen.clone();
            move |view| {
                seen.fetch_add(1, Ordering::SeqCst);
                assert!(view.generation() > 0);
            }
        });
        f.sync.sync_once().await.unwrap();
        f.sync.sync_once().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        f.ledger.fail_next(1);
        let _ = f.sync.sync_once().await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn change_flag_tracks_content() {
        let f = fixture();
        f.writer.ensure_state().await.unwrap();
        f.post(0, "a").await;
        assert!(f.sync.sync_once().await.unwrap().changed());
        assert!(!f.sync.sync_once().await.unwrap().changed());
        f.writer.like_post(0).await.unwrap();
        assert!(f.sync.sync_once().await.unwrap().changed());
    }

    #[tokio::test]
    async fn loop_polls_eagerly_and_stops_cleanly() {
        let f = fixture();
        f.writer.ensure_state().await.unwrap();
        f.post(0, "eager").await;

        let mut rx = f.sync.subscribe();
        let handle = f.sync.start(Duration::from_millis(10));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
        assert!(handle.is_running());

        handle.stop().await;
        let generation = f.sync.current_view().generation();
        f.post(1, "after stop").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.sync.current_view().generation(), generation);
        assert_eq!(f.sync.current_view().len(), 1);
    }

    #[tokio::test]
    async fn loop_survives_fetch_failures() {
        let f = fixture();
        f.ledger.fail_next(2);
        let mut rx = f.sync.subscribe();
        let handle = f.sync.start(Duration::from_millis(5));
        rx.changed().await.unwrap();
        handle.stop().await;

        let stats = f.sync.stats();
        assert_eq!(stats.failures, 2);
        assert!(stats.merges >= 1);
    }

    /// Feed listings that take a while to come back.
    struct SlowLedger {
        inner: Arc<InMemoryLedger>,
        delay: Duration,
    }

    #[async_trait]
    impl Ledger for SlowLedger {
        async fn fetch_account(&self, address: &Address) -> LedgerResult<Option<Account>> {
            self.inner.fetch_account(address).await
        }

        async fn fetch_all_of_kind(&self, kind: AccountKind) -> LedgerResult<Vec<LedgerEntry>> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_all_of_kind(kind).await
        }

        async fn create_account(
            &self,
            address: &Address,
            payload: &AccountPayload,
            authority: &Identity,
        ) -> LedgerResult<()> {
            self.inner.create_account(address, payload, authority).await
        }

        async fn like_post(&self, address: &Address, liker: &Identity) -> LedgerResult<()> {
            self.inner.like_post(address, liker).await
        }
    }

    #[tokio::test]
    async fn stopping_mid_fetch_returns_to_idle() {
        let f = fixture();
        let slow = Arc::new(SlowLedger {
            inner: f.ledger.clone(),
            delay: Duration::from_millis(200),
        });
        let sync = FeedSynchronizer::new(slow, f.deriver);
        let handle = sync.start(Duration::from_secs(2));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sync.phase(), SyncPhase::Fetching);

        handle.stop().await;
        assert_eq!(sync.phase(), SyncPhase::Idle);
        assert_eq!(sync.stats(), SyncStats::default());
        assert_eq!(sync.current_view().generation(), 0);
    }

    #[tokio::test]
    async fn zero_interval_is_raised_to_minimum() {
        let f = fixture();
        f.writer.ensure_state().await.unwrap();
        f.post(0, "still polled").await;

        let mut rx = f.sync.subscribe();
        let handle = f.sync.start(Duration::ZERO);
        rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_running());
        assert_eq!(f.sync.current_view().len(), 1);
        assert!(f.sync.stats().ticks >= 2);
        handle.stop().await;
    }

    #[tokio::test]
    async fn callbacks_may_register_callbacks() {
        let f = fixture();
        let late = Arc::new(AtomicUsize::new(0));
        f.sync.on_view_updated({
            let sync = f.sync.clone();
            let late = late.clone();
            let registered = std::sync::atomic::AtomicBool::new(false);
            move |_| {
                if !registered.swap(true, Ordering::SeqCst) {
                    let late = late.clone();
                    sync.on_view_updated(move |_| {
                        late.fetch_add(1, Ordering::SeqCst);
                    });
                }
            }
        });
        f.sync.sync_once().await.unwrap();
        assert_eq!(late.load(Ordering::SeqCst), 0);
        f.sync.sync_once().await.unwrap();
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let f = fixture();
        let handle = f.sync.start(Duration::from_millis(5));
        let cancel = handle.cancel.clone();
        drop(handle);
        assert!(cancel.is_cancelled());
    }
}
