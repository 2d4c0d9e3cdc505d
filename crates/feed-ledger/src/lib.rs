//! Ledger boundary for the feed sync client.
//!
//! This crate is where writes happen. It provides:
//! - The [`Ledger`] trait: the remote program's fetch/create/like surface
//! - [`InMemoryLedger`]: a faithful stand-in for tests, demos and simulation
//! - [`IdempotentWriter`]: check-before-create, "already exists" is success
//! - [`SequenceCounterStore`]: counter reads and bounded re-derivation on races
//!
//! Concurrent clients are arbitrated by the ledger alone. Nothing here takes
//! a lock that another client could observe.

pub mod counter;
pub mod error;
pub mod memory;
pub mod traits;
pub mod writer;

pub use counter::{CountedWrite, CounterScope, SequenceCounterStore, DEFAULT_WRITE_RETRY_LIMIT};
pub use error::{LedgerError, LedgerResult, WriteError, WriteResult};
pub use memory::{InMemoryLedger, LedgerClock};
pub use traits::Ledger;
pub use writer::{IdempotentWriter, LikeOutcome, WriteOutcome};
