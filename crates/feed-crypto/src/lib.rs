//! Cryptographic primitives for the feed sync client.
//!
//! - [`AddressDeriver`] turns a namespace and indices into a ledger address,
//!   searching bumps until the candidate falls off the Ed25519 curve.
//! - [`ContentHasher`] streams media through SHA-512 so identical content is
//!   always identified by the same [`ContentDigest`](feed_types::ContentDigest).
//! - [`Fingerprinter`] is a domain-separated BLAKE3 hasher used to detect
//!   whether a freshly synchronized view differs from the last one.
//!
//! All crypto operations wrap established libraries; nothing here is custom.

pub mod deriver;
pub mod error;
pub mod fingerprint;
pub mod hasher;

pub use deriver::{AddressDeriver, DerivedAddress, MAX_BUMP_ATTEMPTS, MAX_SEEDS, MAX_SEED_LEN};
pub use error::{CryptoError, CryptoResult};
pub use fingerprint::Fingerprinter;
pub use hasher::{ContentHasher, StreamingHasher, CHUNK_SIZE};
