//! Failure-injecting storage engine for testing.

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::mock_model::Pause;
use crate::error::{Error, Result};
use crate::store::{
    Connection, IndexSpec, MemoryEngine, NamedBank, NewRecord, Record, StorageEngine,
};

type Failures = Arc<Mutex<HashMap<&'static str, usize>>>;
type Holds = Arc<Mutex<HashMap<&'static str, Pause>>>;

/// Wraps a [`MemoryEngine`], counting connects and failing on demand.
pub struct FlakyEngine {
    inner: MemoryEngine,
    connects: AtomicUsize,
    connect_failures: AtomicUsize,
    connect_delay: Option<Duration>,
    failures: Failures,
    holds: Holds,
}

impl FlakyEngine {
    pub fn new(inner: MemoryEngine) -> Self {
        Self {
            inner,
            connects: AtomicUsize::new(0),
            connect_failures: AtomicUsize::new(0),
            connect_delay: None,
            failures: Arc::new(Mutex::new(HashMap::new())),
            holds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fail the first `n` connects
    pub fn fail_connects(self, n: usize) -> Self {
        self.connect_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Simulated connect latency
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Fail the next `n` calls of a connection method, by method name
    pub fn fail_next(&self, op: &'static str, n: usize) {
        self.failures.lock().insert(op, n);
    }

    /// Hold the next call of a connection method after it has been
    /// applied, until the returned handle is released
    pub fn hold_next(&self, op: &'static str) -> Pause {
        let pause = Pause::default();
        self.holds.lock().insert(op, pause.clone());
        pause
    }

    /// Number of connect attempts so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for FlakyEngine {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        let fail = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::StoreOpen("injected connect failure".into()));
        }

        let inner = self.inner.connect().await?;
        Ok(Arc::new(FlakyConnection {
            inner,
            failures: self.failures.clone(),
            holds: self.holds.clone(),
        }))
    }
}

/// Connection that fails scripted operations before delegating and holds
/// scripted operations after
pub struct FlakyConnection {
    inner: Arc<dyn Connection>,
    failures: Failures,
    holds: Holds,
}

impl FlakyConnection {
    fn check(&self, op: &'static str) -> Result<()> {
        let mut failures = self.failures.lock();
        match failures.get_mut(op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(Error::Store(format!("injected {} failure", op)))
            }
            _ => Ok(()),
        }
    }

    async fn after<T>(&self, op: &'static str, result: Result<T>) -> Result<T> {
        let pause = self.holds.lock().remove(op);
        if let Some(pause) = pause {
            pause.hold().await;
        }
        result
    }
}

#[async_trait]
impl Connection for FlakyConnection {
    async fn schema_version(&self) -> Result<u32> {
        self.check("schema_version")?;
        self.after("schema_version", self.inner.schema_version().await).await
    }

    async fn set_schema_version(&self, version: u32) -> Result<()> {
        self.check("set_schema_version")?;
        self.after("set_schema_version", self.inner.set_schema_version(version).await).await
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        self.check("has_collection")?;
        self.after("has_collection", self.inner.has_collection(name).await).await
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        self.check("create_collection")?;
        self.after("create_collection", self.inner.create_collection(name).await).await
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        self.check("index_names")?;
        self.after("index_names", self.inner.index_names(collection).await).await
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<()> {
        self.check("create_index")?;
        self.after("create_index", self.inner.create_index(collection, index).await).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        self.check("drop_index")?;
        self.after("drop_index", self.inner.drop_index(collection, name).await).await
    }

    async fn insert_record(&self, record: NewRecord) -> Result<u64> {
        self.check("insert_record")?;
        self.after("insert_record", self.inner.insert_record(record).await).await
    }

    async fn get_record(&self, id: u64) -> Result<Option<Record>> {
        self.check("get_record")?;
        self.after("get_record", self.inner.get_record(id).await).await
    }

    async fn all_records(&self) -> Result<Vec<Record>> {
        self.check("all_records")?;
        self.after("all_records", self.inner.all_records().await).await
    }

    async fn delete_record(&self, id: u64) -> Result<()> {
        self.check("delete_record")?;
        self.after("delete_record", self.inner.delete_record(id).await).await
    }

    async fn records_by_index(&self, index: &str, value: &str) -> Result<Vec<Record>> {
        self.check("records_by_index")?;
        self.after("records_by_index", self.inner.records_by_index(index, value).await).await
    }

    async fn clear_records(&self) -> Result<()> {
        self.check("clear_records")?;
        self.after("clear_records", self.inner.clear_records().await).await
    }

    async fn put_bank(&self, bank: NamedBank) -> Result<()> {
        self.check("put_bank")?;
        self.after("put_bank", self.inner.put_bank(bank).await).await
    }

    async fn get_bank(&self, name: &str) -> Result<Option<NamedBank>> {
        self.check("get_bank")?;
        self.after("get_bank", self.inner.get_bank(name).await).await
    }

    async fn bank_names(&self) -> Result<Vec<String>> {
        self.check("bank_names")?;
        self.after("bank_names", self.inner.bank_names().await).await
    }

    async fn delete_bank(&self, name: &str) -> Result<()> {
        self.check("delete_bank")?;
        self.after("delete_bank", self.inner.delete_bank(name).await).await
    }
}
