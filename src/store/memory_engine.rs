//! In-Process Storage Engine
//!
//! Ordered tables behind a single lock, with secondary indexes maintained
//! on write and optional snapshot persistence after every mutation.

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::engine::{Connection, IndexSpec, StorageEngine, CUSTOM_BANKS, MEMORIES};
use super::record::{NamedBank, NewRecord, Record};
use crate::error::{Error, Result};
use crate::persistence::{DatabaseImage, MemoriesImage, Snapshot};

#[derive(Debug, Clone)]
struct SecondaryIndex {
    spec: IndexSpec,
    entries: HashMap<String, BTreeSet<u64>>,
}

impl SecondaryIndex {
    fn build(spec: IndexSpec, rows: &BTreeMap<u64, Record>) -> Self {
        let mut index = Self {
            spec,
            entries: HashMap::new(),
        };
        for record in rows.values() {
            index.add(record);
        }
        index
    }

    fn add(&mut self, record: &Record) {
        let key = self.spec.field.extract(record).to_string();
        self.entries.entry(key).or_default().insert(record.id);
    }

    fn remove(&mut self, record: &Record) {
        let key = self.spec.field.extract(record);
        if let Some(ids) = self.entries.get_mut(key) {
            ids.remove(&record.id);
            if ids.is_empty() {
                self.entries.remove(key);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RecordTable {
    rows: BTreeMap<u64, Record>,
    indexes: Vec<SecondaryIndex>,
}

impl RecordTable {
    fn insert(&mut self, record: Record) {
        for index in &mut self.indexes {
            index.add(&record);
        }
        self.rows.insert(record.id, record);
    }

    fn remove(&mut self, id: u64) -> Option<Record> {
        let record = self.rows.remove(&id)?;
        for index in &mut self.indexes {
            index.remove(&record);
        }
        Some(record)
    }

    fn clear(&mut self) {
        self.rows.clear();
        for index in &mut self.indexes {
            index.entries.clear();
        }
    }

    fn lookup(&self, index: &str, value: &str) -> Result<Vec<Record>> {
        let index = self
            .indexes
            .iter()
            .find(|i| i.spec.name == index)
            .ok_or_else(|| Error::Store(format!("No index named '{}' on {}", index, MEMORIES)))?;

        Ok(index
            .entries
            .get(value)
            .map(|ids| ids.iter().filter_map(|id| self.rows.get(id).cloned()).collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct Database {
    schema_version: u32,
    next_id: u64,
    memories: Option<RecordTable>,
    custom_banks: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            schema_version: 0,
            next_id: 1,
            memories: None,
            custom_banks: None,
        }
    }
}

impl Database {
    fn memories(&self) -> Result<&RecordTable> {
        self.memories.as_ref().ok_or_else(|| missing(MEMORIES))
    }

    fn memories_mut(&mut self) -> Result<&mut RecordTable> {
        self.memories.as_mut().ok_or_else(|| missing(MEMORIES))
    }

    fn banks(&self) -> Result<&BTreeMap<String, Vec<String>>> {
        self.custom_banks.as_ref().ok_or_else(|| missing(CUSTOM_BANKS))
    }

    fn banks_mut(&mut self) -> Result<&mut BTreeMap<String, Vec<String>>> {
        self.custom_banks.as_mut().ok_or_else(|| missing(CUSTOM_BANKS))
    }

    fn to_image(&self) -> DatabaseImage {
        DatabaseImage {
            schema_version: self.schema_version,
            next_id: self.next_id,
            memories: self.memories.as_ref().map(|table| MemoriesImage {
                indexes: table.indexes.iter().map(|i| i.spec.clone()).collect(),
                records: table.rows.values().cloned().collect(),
            }),
            custom_banks: self.custom_banks.as_ref().map(|banks| {
                banks
                    .iter()
                    .map(|(name, content)| NamedBank::new(name.clone(), content.clone()))
                    .collect()
            }),
        }
    }

    fn from_image(image: DatabaseImage) -> Result<Self> {
        let memories = match image.memories {
            Some(memories) => {
                let rows: BTreeMap<u64, Record> =
                    memories.records.into_iter().map(|r| (r.id, r)).collect();
                let indexes = memories
                    .indexes
                    .into_iter()
                    .map(|spec| SecondaryIndex::build(spec, &rows))
                    .collect();
                Some(RecordTable { rows, indexes })
            }
            None => None,
        };

        let max_id = memories
            .as_ref()
            .and_then(|t| t.rows.keys().next_back().copied())
            .unwrap_or(0);

        Ok(Self {
            schema_version: image.schema_version,
            next_id: image.next_id.max(max_id + 1).max(1),
            memories,
            custom_banks: image
                .custom_banks
                .map(|banks| banks.into_iter().map(|b| (b.name, b.content)).collect()),
        })
    }
}

fn missing(collection: &str) -> Error {
    Error::Store(format!("Collection '{}' does not exist", collection))
}

/// In-process storage engine
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    db: Arc<RwLock<Database>>,
    snapshot: Option<Snapshot>,
    loaded: Arc<AtomicBool>,
    save_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryEngine {
    /// Create an ephemeral engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine persisted to a snapshot file
    pub fn with_snapshot<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            snapshot: Some(Snapshot::new(path)),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        if let Some(snapshot) = &self.snapshot {
            if !self.loaded.load(Ordering::Acquire) {
                if let Some(image) = snapshot.load().await? {
                    let db = Database::from_image(image)?;
                    info!(
                        path = %snapshot.path().display(),
                        schema_version = db.schema_version,
                        "Loaded snapshot"
                    );
                    *self.db.write() = db;
                }
                self.loaded.store(true, Ordering::Release);
            }
        }

        Ok(Arc::new(MemoryConnection {
            db: self.db.clone(),
            snapshot: self.snapshot.clone(),
            save_lock: self.save_lock.clone(),
        }))
    }
}

/// Connection to a [`MemoryEngine`]
pub struct MemoryConnection {
    db: Arc<RwLock<Database>>,
    snapshot: Option<Snapshot>,
    save_lock: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryConnection {
    /// Apply a mutation to the tables.
    ///
    /// With a snapshot the mutation runs on a copy, and the copy replaces
    /// the live tables only after it was written out. A failed write leaves
    /// the tables untouched.
    async fn commit<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send,
        T: Send,
    {
        let Some(snapshot) = &self.snapshot else {
            return mutate(&mut *self.db.write());
        };

        let _guard = self.save_lock.lock().await;
        let (value, staged) = {
            let mut staged = self.db.read().clone();
            let value = mutate(&mut staged)?;
            (value, staged)
        };
        snapshot
            .save(&staged.to_image())
            .await
            .map_err(|e| Error::Store(format!("Failed to persist snapshot: {}", e)))?;
        *self.db.write() = staged;
        debug!(path = %snapshot.path().display(), "Snapshot written");
        Ok(value)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn schema_version(&self) -> Result<u32> {
        Ok(self.db.read().schema_version)
    }

    async fn set_schema_version(&self, version: u32) -> Result<()> {
        self.commit(move |db| {
            db.schema_version = version;
            Ok(())
        })
        .await
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let db = self.db.read();
        match name {
            MEMORIES => Ok(db.memories.is_some()),
            CUSTOM_BANKS => Ok(db.custom_banks.is_some()),
            _ => Ok(false),
        }
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        self.commit(move |db| {
            let exists = match name {
                MEMORIES => db.memories.is_some(),
                CUSTOM_BANKS => db.custom_banks.is_some(),
                other => {
                    return Err(Error::Store(format!("Unknown collection '{}'", other)));
                }
            };
            if exists {
                return Err(Error::Store(format!("Collection '{}' already exists", name)));
            }
            match name {
                MEMORIES => db.memories = Some(RecordTable::default()),
                _ => db.custom_banks = Some(BTreeMap::new()),
            }
            Ok(())
        })
        .await
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        let db = self.db.read();
        match collection {
            MEMORIES => Ok(db
                .memories()?
                .indexes
                .iter()
                .map(|i| i.spec.name.clone())
                .collect()),
            CUSTOM_BANKS => db.banks().map(|_| Vec::new()),
            other => Err(missing(other)),
        }
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<()> {
        if collection != MEMORIES {
            return Err(Error::Store(format!(
                "Collection '{}' does not support indexes",
                collection
            )));
        }
        self.commit(move |db| {
            let table = db.memories_mut()?;
            if table.indexes.iter().any(|i| i.spec.name == index.name) {
                return Err(Error::Store(format!(
                    "Index '{}' already exists on {}",
                    index.name, collection
                )));
            }
            let built = SecondaryIndex::build(index, &table.rows);
            table.indexes.push(built);
            Ok(())
        })
        .await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<()> {
        if collection != MEMORIES {
            return Err(missing(collection));
        }
        self.commit(move |db| {
            let table = db.memories_mut()?;
            let before = table.indexes.len();
            table.indexes.retain(|i| i.spec.name != name);
            if table.indexes.len() == before {
                return Err(Error::Store(format!(
                    "No index named '{}' on {}",
                    name, collection
                )));
            }
            Ok(())
        })
        .await
    }

    async fn insert_record(&self, record: NewRecord) -> Result<u64> {
        self.commit(move |db| {
            let id = db.next_id;
            db.memories_mut()?.insert(record.with_id(id));
            db.next_id += 1;
            Ok(id)
        })
        .await
    }

    async fn get_record(&self, id: u64) -> Result<Option<Record>> {
        Ok(self.db.read().memories()?.rows.get(&id).cloned())
    }

    async fn all_records(&self) -> Result<Vec<Record>> {
        Ok(self.db.read().memories()?.rows.values().cloned().collect())
    }

    async fn delete_record(&self, id: u64) -> Result<()> {
        if !self.db.read().memories()?.rows.contains_key(&id) {
            return Ok(());
        }
        self.commit(move |db| {
            db.memories_mut()?.remove(id);
            Ok(())
        })
        .await
    }

    async fn records_by_index(&self, index: &str, value: &str) -> Result<Vec<Record>> {
        self.db.read().memories()?.lookup(index, value)
    }

    async fn clear_records(&self) -> Result<()> {
        self.commit(|db| {
            db.memories_mut()?.clear();
            Ok(())
        })
        .await
    }

    async fn put_bank(&self, bank: NamedBank) -> Result<()> {
        self.commit(move |db| {
            db.banks_mut()?.insert(bank.name, bank.content);
            Ok(())
        })
        .await
    }

    async fn get_bank(&self, name: &str) -> Result<Option<NamedBank>> {
        Ok(self
            .db
            .read()
            .banks()?
            .get(name)
            .map(|content| NamedBank::new(name, content.clone())))
    }

    async fn bank_names(&self) -> Result<Vec<String>> {
        Ok(self.db.read().banks()?.keys().cloned().collect())
    }

    async fn delete_bank(&self, name: &str) -> Result<()> {
        if !self.db.read().banks()?.contains_key(name) {
            return Ok(());
        }
        self.commit(move |db| {
            db.banks_mut()?.remove(name);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordField;
    use tempfile::tempdir;

    async fn connected() -> Arc<dyn Connection> {
        let conn = MemoryEngine::new().connect().await.unwrap();
        conn.create_collection(MEMORIES).await.unwrap();
        conn.create_collection(CUSTOM_BANKS).await.unwrap();
        conn.create_index(MEMORIES, IndexSpec::new("bank", RecordField::Bank))
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let conn = connected().await;
        let a = conn
            .insert_record(NewRecord::new("b", 0, "one", vec![1.0]))
            .await
            .unwrap();
        let b = conn
            .insert_record(NewRecord::new("b", 1, "two", vec![1.0]))
            .await
            .unwrap();
        conn.delete_record(b).await.unwrap();
        let c = conn
            .insert_record(NewRecord::new("b", 1, "two", vec![1.0]))
            .await
            .unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_index_lookup_tracks_deletes() {
        let conn = connected().await;
        let id = conn
            .insert_record(NewRecord::new("space", 0, "Mars is red", vec![0.1]))
            .await
            .unwrap();
        conn.insert_record(NewRecord::new("ocean", 0, "Salt water", vec![0.2]))
            .await
            .unwrap();

        assert_eq!(conn.records_by_index("bank", "space").await.unwrap().len(), 1);
        conn.delete_record(id).await.unwrap();
        assert!(conn.records_by_index("bank", "space").await.unwrap().is_empty());
        assert_eq!(conn.records_by_index("bank", "ocean").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_index_is_an_error() {
        let conn = connected().await;
        let err = conn.records_by_index("text", "x").await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_is_not_applied() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        let conn = MemoryEngine::with_snapshot(sub.join("factbank.snap"))
            .connect()
            .await
            .unwrap();
        conn.create_collection(MEMORIES).await.unwrap();
        conn.create_collection(CUSTOM_BANKS).await.unwrap();
        conn.create_index(MEMORIES, IndexSpec::new("bank", RecordField::Bank))
            .await
            .unwrap();
        let kept = conn
            .insert_record(NewRecord::new("notes", 0, "kept", vec![1.0]))
            .await
            .unwrap();

        // a regular file where the snapshot directory should be
        std::fs::remove_dir_all(&sub).unwrap();
        std::fs::write(&sub, b"not a directory").unwrap();

        let err = conn
            .insert_record(NewRecord::new("notes", 1, "lost", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(conn
            .put_bank(NamedBank::new("notes", vec!["x".into()]))
            .await
            .is_err());
        assert!(conn.delete_record(kept).await.is_err());
        assert!(conn.clear_records().await.is_err());

        let records = conn.all_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "kept");
        assert_eq!(conn.records_by_index("bank", "notes").await.unwrap().len(), 1);
        assert!(conn.bank_names().await.unwrap().is_empty());

        std::fs::remove_file(&sub).unwrap();
        let next = conn
            .insert_record(NewRecord::new("notes", 1, "again", vec![1.0]))
            .await
            .unwrap();
        assert_eq!(next, kept + 1);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let conn = MemoryEngine::new().connect().await.unwrap();
        assert!(!conn.has_collection(MEMORIES).await.unwrap());
        assert!(conn.all_records().await.is_err());
        assert!(conn.bank_names().await.is_err());
        assert!(conn.create_collection("other").await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("factbank.snap");

        {
            let conn = MemoryEngine::with_snapshot(&path).connect().await.unwrap();
            conn.create_collection(MEMORIES).await.unwrap();
            conn.create_collection(CUSTOM_BANKS).await.unwrap();
            conn.create_index(MEMORIES, IndexSpec::new("bank", RecordField::Bank))
                .await
                .unwrap();
            conn.insert_record(NewRecord::new("notes", 0, "hello", vec![0.5, 0.5]))
                .await
                .unwrap();
            conn.put_bank(NamedBank::new("notes", vec!["hello".into()]))
                .await
                .unwrap();
            conn.set_schema_version(2).await.unwrap();
        }

        let conn = MemoryEngine::with_snapshot(&path).connect().await.unwrap();
        assert_eq!(conn.schema_version().await.unwrap(), 2);
        let records = conn.records_by_index("bank", "notes").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].embedding, vec![0.5, 0.5]);
        assert_eq!(conn.bank_names().await.unwrap(), vec!["notes".to_string()]);

        let next = conn
            .insert_record(NewRecord::new("notes", 1, "again", vec![]))
            .await
            .unwrap();
        assert!(next > records[0].id);
    }
}
