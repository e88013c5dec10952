//! Storage Engine Seam
//!
//! The access pattern the store needs from an underlying key-value engine:
//! two collections, schema introspection for migrations, and secondary
//! index equality lookups.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::record::{NamedBank, NewRecord, Record};
use crate::error::Result;

/// Collection holding embedded records, keyed by auto-assigned id
pub const MEMORIES: &str = "memories";

/// Collection holding custom bank definitions, keyed by name
pub const CUSTOM_BANKS: &str = "custom_banks";

/// Record fields an index can be built over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Bank,
    Text,
}

impl RecordField {
    /// Value of this field for a record
    pub fn extract<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            RecordField::Bank => &record.bank,
            RecordField::Text => &record.text,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            RecordField::Bank => 1,
            RecordField::Text => 2,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordField::Bank),
            2 => Some(RecordField::Text),
            _ => None,
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordField::Bank => write!(f, "bank"),
            RecordField::Text => write!(f, "text"),
        }
    }
}

/// Secondary index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub field: RecordField,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, field: RecordField) -> Self {
        Self {
            name: name.into(),
            field,
        }
    }
}

/// An open connection to a storage engine.
///
/// Every method is one request; a failure affects only that request.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Schema version recorded by the last migration (0 for a fresh store)
    async fn schema_version(&self) -> Result<u32>;
    async fn set_schema_version(&self, version: u32) -> Result<()>;

    async fn has_collection(&self, name: &str) -> Result<bool>;
    async fn create_collection(&self, name: &str) -> Result<()>;

    async fn index_names(&self, collection: &str) -> Result<Vec<String>>;
    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<()>;
    async fn drop_index(&self, collection: &str, name: &str) -> Result<()>;

    async fn insert_record(&self, record: NewRecord) -> Result<u64>;
    async fn get_record(&self, id: u64) -> Result<Option<Record>>;
    async fn all_records(&self) -> Result<Vec<Record>>;
    async fn delete_record(&self, id: u64) -> Result<()>;
    /// Equality lookup through a secondary index, in id order
    async fn records_by_index(&self, index: &str, value: &str) -> Result<Vec<Record>>;
    async fn clear_records(&self) -> Result<()>;

    async fn put_bank(&self, bank: NamedBank) -> Result<()>;
    async fn get_bank(&self, name: &str) -> Result<Option<NamedBank>>;
    async fn bank_names(&self) -> Result<Vec<String>>;
    async fn delete_bank(&self, name: &str) -> Result<()>;
}

/// Something that can open connections.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Connection>>;
}
