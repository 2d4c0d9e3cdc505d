use feed_crypto::CryptoError;

/// Errors reported by the ledger boundary itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger could not be reached or did not answer. Reads failing this
    /// way may be retried; they say nothing about whether an account exists.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// An account already occupies the address. Two racing creates for the
    /// same address end with exactly one winner and this error for the rest.
    #[error("account already in use: {address}")]
    AccountInUse { address: String },

    /// The program refused the instruction.
    #[error("instruction rejected: {reason}")]
    Rejected { reason: String },

    #[error("post already liked by this identity")]
    AlreadyLiked,
}

impl LedgerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors surfaced by the write path (writer and counter store).
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The ledger refused the create. Not retried; the caller decides.
    #[error("write rejected: {reason}")]
    Rejected { reason: String },

    /// A read failed for a reason other than "not found". Safe to retry with
    /// backoff because nothing was written.
    #[error("transient read failure: {0}")]
    TransientRead(#[source] LedgerError),

    /// Every re-derivation lost its race.
    #[error("concurrent write conflict on {scope} after {attempts} attempts")]
    ConcurrentWriteConflict { scope: String, attempts: u32 },

    /// The record that owns the counter does not exist (e.g. commenting on a
    /// post that was never created).
    #[error("parent record missing: {locator}")]
    ParentMissing { locator: String },

    #[error("derivation failed: {0}")]
    Derivation(#[from] CryptoError),
}

impl WriteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientRead(_))
    }
}

pub type WriteResult<T> = Result<T, WriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(LedgerError::Unavailable("timeout".into()).is_transient());
        assert!(!LedgerError::rejected("bad").is_transient());
        assert!(!LedgerError::AlreadyLiked.is_transient());
    }

    #[test]
    fn only_transient_reads_are_retryable() {
        let transient = WriteError::TransientRead(LedgerError::Unavailable("x".into()));
        assert!(transient.is_retryable());
        let rejected = WriteError::Rejected { reason: "no".into() };
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn conflict_message_names_scope() {
        let e = WriteError::ConcurrentWriteConflict {
            scope: "posts".into(),
            attempts: 3,
        };
        assert_eq!(e.to_string(), "concurrent write conflict on posts after 3 attempts");
    }
}
