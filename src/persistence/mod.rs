//! Persistence Module
//!
//! Snapshot files for the in-process storage engine.

mod snapshot;

pub use snapshot::{decode, encode, DatabaseImage, MemoriesImage, Snapshot};
