use std::io;

/// Errors from derivation and hashing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// No bump produced a valid address. Never expected with a sound program
    /// identity; the operation must be aborted, not retried.
    #[error("address derivation exhausted {attempts} bumps for {locator}")]
    DerivationExhausted { locator: String, attempts: usize },

    #[error("seed {index} is {len} bytes, at most {max} allowed")]
    SeedTooLong { index: usize, len: usize, max: usize },

    #[error("{count} seeds given, at most {max} allowed")]
    TooManySeeds { count: usize, max: usize },

    /// The content stream could not be read to the end. No digest is
    /// produced, so nothing may be written to the ledger for it.
    #[error("content read failed after {bytes_read} bytes: {source}")]
    HashIo {
        bytes_read: u64,
        #[source]
        source: io::Error,
    },
}

pub type CryptoResult<T> = Result<T, CryptoError>;
