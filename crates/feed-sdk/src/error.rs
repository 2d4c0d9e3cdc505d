use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("nothing to post: no text and no media")]
    EmptyPost,

    #[error("write error: {0}")]
    Write(#[from] feed_ledger::WriteError),

    #[error("sync error: {0}")]
    Sync(#[from] feed_sync::SyncError),

    #[error("crypto error: {0}")]
    Crypto(#[from] feed_crypto::CryptoError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;

/// Failure reported by a media uploader.
#[derive(Debug, Error)]
#[error("upload failed: {0}")]
pub struct UploadError(pub String);
