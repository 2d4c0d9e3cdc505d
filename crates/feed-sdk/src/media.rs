//! Media upload boundary.
//!
//! The session only needs a digest of the content; where the bytes end up
//! is the uploader's business.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use feed_types::ContentDigest;

use crate::error::UploadError;

pub type MediaReader = Box<dyn AsyncRead + Send + Unpin>;

/// Something that can be read as a byte stream, possibly more than once.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Human-readable name for logs.
    fn describe(&self) -> String;

    /// Expected length, if known up front. A stream that ends early is
    /// treated as truncated.
    async fn len_hint(&self) -> io::Result<Option<u64>>;

    async fn open(&self) -> io::Result<MediaReader>;
}

/// Accepts media for storage outside the ledger.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, digest: &ContentDigest, source: &dyn MediaSource) -> Result<(), UploadError>;
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MediaSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn len_hint(&self) -> io::Result<Option<u64>> {
        Ok(Some(tokio::fs::metadata(&self.path).await?.len()))
    }

    async fn open(&self) -> io::Result<MediaReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

pub struct BytesSource {
    name: String,
    data: Vec<u8>,
}

impl BytesSource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl MediaSource for BytesSource {
    fn describe(&self) -> String {
        format!("{} ({} bytes)", self.name, self.data.len())
    }

    async fn len_hint(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    async fn open(&self) -> io::Result<MediaReader> {
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }
}

/// Uploader that accepts everything and stores nothing.
#[derive(Debug, Default)]
pub struct NoopUploader;

#[async_trait]
impl MediaUploader for NoopUploader {
    async fn upload(&self, _digest: &ContentDigest, _source: &dyn MediaSource) -> Result<(), UploadError> {
        Ok(())
    }
}

/// Content-addressed blob store in memory. Identical content is stored once.
#[derive(Debug, Default)]
pub struct InMemoryUploader {
    blobs: RwLock<HashMap<ContentDigest, Vec<u8>>>,
}

impl InMemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.blobs.read().expect("lock poisoned").contains_key(digest)
    }
}

#[async_trait]
impl MediaUploader for InMemoryUploader {
    async fn upload(&self, digest: &ContentDigest, source: &dyn MediaSource) -> Result<(), UploadError> {
        if self.contains(digest) {
            return Ok(());
        }
        let mut reader = source
            .open()
            .await
            .map_err(|e| UploadError(format!("{}: {e}", source.describe())))?;
        let mut data = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut data)
            .await
            .map_err(|e| UploadError(format!("{}: {e}", source.describe())))?;
        self.blobs
            .write()
            .expect("lock poisoned")
            .entry(*digest)
            .or_insert(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_crypto::ContentHasher;

    #[tokio::test]
    async fn bytes_source_reopens() {
        let source = BytesSource::new("clip", b"video".to_vec());
        for _ in 0..2 {
            let digest = ContentHasher::hash_reader(source.open().await.unwrap()).await.unwrap();
            assert_eq!(digest, ContentHasher::hash_bytes(b"video"));
        }
        assert_eq!(source.len_hint().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"frames").unwrap();
        let source = FileSource::new(&path);
        assert_eq!(source.len_hint().await.unwrap(), Some(6));
        let digest = ContentHasher::hash_reader(source.open().await.unwrap()).await.unwrap();
        assert!(ContentHasher::verify(b"frames", &digest));
        assert!(FileSource::new(dir.path().join("nope")).open().await.is_err());
    }

    #[tokio::test]
    async fn in_memory_uploader_dedups() {
        let uploader = InMemoryUploader::new();
        let source = BytesSource::new("clip", b"same bytes".to_vec());
        let digest = ContentHasher::hash_bytes(b"same bytes");
        uploader.upload(&digest, &source).await.unwrap();
        uploader.upload(&digest, &source).await.unwrap();
        assert_eq!(uploader.len(), 1);
        assert!(uploader.contains(&digest));
    }
}
