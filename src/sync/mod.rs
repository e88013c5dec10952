//! Bank Synchronization
//!
//! Keeps the cached records of a bank in step with its declared content.

mod synchronizer;

pub use synchronizer::{is_stale, BankSynchronizer, SyncOutcome, SyncSummary};
