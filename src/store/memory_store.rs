//! Memory Store
//!
//! Record and bank access over a lazily opened storage connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::engine::{
    Connection, IndexSpec, RecordField, StorageEngine, CUSTOM_BANKS, MEMORIES,
};
use super::record::{NamedBank, NewRecord, Record};
use crate::error::{Error, Result};
use crate::lazy::LazyHandle;
use crate::metrics::Metrics;

/// Schema version written by [`MemoryStore::ensure_open`]
pub const SCHEMA_VERSION: u32 = 2;

/// Name of the secondary index on `memories.bank`
pub const BANK_INDEX: &str = "bank";

/// Record and bank store
///
/// The connection is opened on first use. Concurrent first callers share
/// one open; a failed open is forgotten so the next call starts over.
pub struct MemoryStore {
    engine: Arc<dyn StorageEngine>,
    conn: LazyHandle<dyn Connection>,
    metrics: Arc<Metrics>,
}

impl MemoryStore {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            conn: LazyHandle::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Check if a connection is currently open
    pub fn is_open(&self) -> bool {
        self.conn.is_ready()
    }

    /// Open the connection and migrate the schema, once.
    pub async fn ensure_open(&self) -> Result<Arc<dyn Connection>> {
        let engine = self.engine.clone();
        self.conn
            .get_or_init(move || async move {
                let conn = engine.connect().await.map_err(open_failed)?;
                migrate(conn.as_ref()).await.map_err(open_failed)?;
                info!(schema_version = SCHEMA_VERSION, "Store opened");
                Ok(conn)
            })
            .await
            .inspect_err(|e| {
                warn!(error = %e, attempts = self.conn.attempts(), "Store open failed")
            })
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.ensure_open().await?;
        let start = Instant::now();
        let result = f(conn).await;
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => self.metrics.record_operation(op, elapsed),
            Err(e) => {
                self.metrics.record_failure(op, elapsed);
                debug!(op, error = %e, "Store operation failed");
            }
        }
        result
    }

    /// Insert a record, returning its assigned id
    pub async fn put(&self, record: NewRecord) -> Result<u64> {
        self.run("put", |conn| async move { conn.insert_record(record).await })
            .await
    }

    pub async fn get(&self, id: u64) -> Result<Option<Record>> {
        self.run("get", |conn| async move { conn.get_record(id).await })
            .await
    }

    pub async fn get_all(&self) -> Result<Vec<Record>> {
        self.run("get_all", |conn| async move { conn.all_records().await })
            .await
    }

    pub async fn delete(&self, id: u64) -> Result<()> {
        self.run("delete", |conn| async move { conn.delete_record(id).await })
            .await
    }

    /// Records of one bank, in declared content order
    pub async fn get_by_bank(&self, bank: &str) -> Result<Vec<Record>> {
        self.run("get_by_bank", |conn| async move {
            let mut records = conn.records_by_index(BANK_INDEX, bank).await?;
            records.sort_by_key(|r| (r.seq, r.id));
            Ok(records)
        })
        .await
    }

    /// Delete every record of a bank, returning how many were removed
    pub async fn delete_by_bank(&self, bank: &str) -> Result<usize> {
        self.run("delete_by_bank", |conn| async move {
            let records = conn.records_by_index(BANK_INDEX, bank).await?;
            for record in &records {
                conn.delete_record(record.id).await?;
            }
            Ok(records.len())
        })
        .await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.run("clear_all", |conn| async move { conn.clear_records().await })
            .await
    }

    /// Insert or replace a bank definition by name
    pub async fn save_bank(&self, bank: NamedBank) -> Result<()> {
        self.run("save_bank", |conn| async move { conn.put_bank(bank).await })
            .await
    }

    pub async fn get_bank(&self, name: &str) -> Result<Option<NamedBank>> {
        self.run("get_bank", |conn| async move { conn.get_bank(name).await })
            .await
    }

    pub async fn list_bank_names(&self) -> Result<Vec<String>> {
        self.run("list_bank_names", |conn| async move {
            let mut names = conn.bank_names().await?;
            names.sort();
            Ok(names)
        })
        .await
    }

    pub async fn delete_bank(&self, name: &str) -> Result<()> {
        self.run("delete_bank", |conn| async move { conn.delete_bank(name).await })
            .await
    }
}

fn open_failed(err: Error) -> Error {
    match err {
        Error::StoreOpen(_) => err,
        other => Error::StoreOpen(other.to_string()),
    }
}

/// Bring a connection up to [`SCHEMA_VERSION`].
///
/// Safe to run on every open: collections and the bank index are created
/// only when absent, and any other index on `memories` is dropped.
async fn migrate(conn: &dyn Connection) -> Result<()> {
    let from = conn.schema_version().await?;

    if !conn.has_collection(MEMORIES).await? {
        conn.create_collection(MEMORIES).await?;
    }

    let indexes = conn.index_names(MEMORIES).await?;
    for name in indexes.iter().filter(|name| name.as_str() != BANK_INDEX) {
        conn.drop_index(MEMORIES, name).await?;
        info!(index = %name, "Dropped stale index");
    }
    if !indexes.iter().any(|name| name == BANK_INDEX) {
        conn.create_index(MEMORIES, IndexSpec::new(BANK_INDEX, RecordField::Bank))
            .await?;
    }

    if !conn.has_collection(CUSTOM_BANKS).await? {
        conn.create_collection(CUSTOM_BANKS).await?;
    }

    if from != SCHEMA_VERSION {
        conn.set_schema_version(SCHEMA_VERSION).await?;
        info!(from, to = SCHEMA_VERSION, "Store schema migrated");
    }
    Ok(())
}
