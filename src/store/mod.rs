//! Storage Layer
//!
//! Persisted records and bank definitions, reached through a generic
//! storage engine with one secondary index.

mod engine;
mod memory_engine;
mod memory_store;
mod record;

pub use engine::{Connection, IndexSpec, RecordField, StorageEngine, CUSTOM_BANKS, MEMORIES};
pub use memory_engine::{MemoryConnection, MemoryEngine};
pub use memory_store::{MemoryStore, BANK_INDEX, SCHEMA_VERSION};
pub use record::{NamedBank, NewRecord, Record};
