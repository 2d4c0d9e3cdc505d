/// Domain-separated BLAKE3 hasher for change detection.
///
/// Not used for anything security-relevant: it summarizes a view so two
/// successive snapshots can be compared without walking both.
pub struct Fingerprinter {
    inner: blake3::Hasher,
}

impl Fingerprinter {
    /// Domain tag for feed view fingerprints.
    pub const VIEW: &'static str = "feed-view-v1";

    pub fn new(domain: &str) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(domain.as_bytes());
        inner.update(b":");
        Self { inner }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.inner.update(&value.to_be_bytes());
        self
    }

    pub fn finalize(&self) -> [u8; 32] {
        *self.inner.finalize().as_bytes()
    }
}
