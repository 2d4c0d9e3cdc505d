use thiserror::Error;

use feed_crypto::CryptoError;
use feed_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The ledger could not be read. The loop absorbs this and keeps the
    /// previous view; only single-shot calls return it.
    #[error("fetch failed: {0}")]
    FetchFailed(#[source] LedgerError),

    #[error("post {index} does not exist")]
    PostMissing { index: u64 },

    #[error("derivation error: {0}")]
    Derivation(#[from] CryptoError),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FetchFailed(e) if e.is_transient())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
