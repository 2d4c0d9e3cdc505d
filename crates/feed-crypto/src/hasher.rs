use std::path::Path;

use sha2::{Digest, Sha512};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use feed_types::ContentDigest;

use crate::error::{CryptoError, CryptoResult};

/// Read size for streamed hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental SHA-512 state. Feed it chunks as they arrive and finalize
/// once the whole stream has been seen.
#[derive(Clone, Default)]
pub struct StreamingHasher {
    inner: Sha512,
    bytes: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> ContentDigest {
        let mut out = [0u8; 64];
        out.copy_from_slice(&self.inner.finalize());
        ContentDigest::from_bytes(out)
    }
}

impl std::fmt::Debug for StreamingHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingHasher")
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// SHA-512 content hasher for uploaded media.
///
/// The digest is the dedup key and the ledger payload for media posts, so
/// it is only ever produced from a stream that was read to the end.
pub struct ContentHasher;

impl ContentHasher {
    /// Hash an in-memory buffer.
    pub fn hash_bytes(data: &[u8]) -> ContentDigest {
        let mut hasher = StreamingHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Verify that data produces the expected digest.
    pub fn verify(data: &[u8], expected: &ContentDigest) -> bool {
        Self::hash_bytes(data) == *expected
    }

    /// Stream a reader to EOF in [`CHUNK_SIZE`] chunks.
    ///
    /// Yields to the runtime between chunks so a large upload does not
    /// starve other tasks (the sync loop in particular).
    pub async fn hash_reader<R>(reader: R) -> CryptoResult<ContentDigest>
    where
        R: AsyncRead + Unpin,
    {
        Self::hash_reader_expecting(reader, None).await
    }

    /// Like [`Self::hash_reader`], but a stream that ends before
    /// `expected_len` bytes is treated as truncated.
    pub async fn hash_reader_expecting<R>(
        mut reader: R,
        expected_len: Option<u64>,
    ) -> CryptoResult<ContentDigest>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = StreamingHasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|source| CryptoError::HashIo {
                    bytes_read: hasher.bytes_hashed(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tokio::task::yield_now().await;
        }

        if let Some(expected) = expected_len {
            if hasher.bytes_hashed() != expected {
                return Err(CryptoError::HashIo {
                    bytes_read: hasher.bytes_hashed(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("expected {expected} bytes"),
                    ),
                });
            }
        }

        let bytes = hasher.bytes_hashed();
        let digest = hasher.finalize();
        debug!(bytes, digest = %digest.short_hex(), "content hashed");
        Ok(digest)
    }

    /// Hash a file, checking the byte count against its metadata.
    pub async fn hash_file(path: impl AsRef<Path>) -> CryptoResult<ContentDigest> {
        let io_err = |source| CryptoError::HashIo {
            bytes_read: 0,
            source,
        };
        let file = tokio::fs::File::open(path.as_ref()).await.map_err(io_err)?;
        let len = file.metadata().await.map_err(io_err)?.len();
        Self::hash_reader_expecting(file, Some(len)).await
    }
}
