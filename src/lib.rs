//! FACTBANK - Embedding Cache for Fact Banks
//!
//! Keeps named banks of short text facts embedded in a local store,
//! re-embedding a bank only when its content changes, and serves
//! similarity search and nearest-neighbor graphs over it.

pub mod banks;
pub mod config;
pub mod embedding;
pub mod error;
pub mod lazy;
pub mod metrics;
pub mod persistence;
pub mod search;
pub mod store;
pub mod sync;
pub mod testing;
pub mod vector;

pub use banks::{BankGraph, BankInfo, BankKind, BankService};
pub use config::Config;
pub use embedding::{
    EmbedOptions, EmbeddingConfig, EmbeddingModel, EmbeddingProvider, EmbeddingService,
    HashingLoader, HashingModel, ModelLoader,
};
pub use error::{Error, Result};
pub use lazy::LazyHandle;
pub use metrics::Metrics;
pub use persistence::Snapshot;
pub use search::{RankedFact, Relevance, SearchRanker};
pub use store::{MemoryEngine, MemoryStore, NamedBank, NewRecord, Record, StorageEngine};
pub use sync::{BankSynchronizer, SyncOutcome, SyncSummary};
pub use vector::{build_neighbor_graph, cosine_similarity, GraphParams, NeighborGraph};
