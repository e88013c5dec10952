//! Error types for factbank.

use thiserror::Error;

/// Result type alias for factbank operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store, the embedding provider and the bank layer.
///
/// Variants carry rendered messages rather than source errors so one failure
/// can be handed to every caller awaiting the same coalesced future.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Opening the store or migrating its schema failed.
    #[error("Store open failed: {0}")]
    StoreOpen(String),

    /// A single store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Loading the embedding model failed.
    #[error("Embedding provider initialization failed: {0}")]
    ProviderInit(String),

    /// A single embedding request failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A bank definition was rejected or the bank does not exist.
    #[error("Invalid bank: {0}")]
    InvalidBank(String),

    /// A custom bank declared more entries than allowed.
    #[error("Bank has {entries} entries, at most {max} are allowed")]
    BankTooLarge { entries: usize, max: usize },

    /// Reading or writing a snapshot file failed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Snapshot(err.to_string())
    }
}
